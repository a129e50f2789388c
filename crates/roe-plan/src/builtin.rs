//! Built-in plans for the `database`, `webapp` and `network` system types

use crate::plan::SystemRecoveryPlan;
use crate::task::RecoveryTask;
use crate::types::{Action, Criticality, Phase, Priority};

pub(crate) fn plans() -> Vec<(&'static str, SystemRecoveryPlan)> {
    vec![
        ("database", database()),
        ("webapp", webapp()),
        ("network", network()),
    ]
}

fn shell_all(task: RecoveryTask, commands: &[&str]) -> RecoveryTask {
    commands
        .iter()
        .fold(task, |t, c| t.with_action(Action::shell(*c)))
}

fn rollback_all(task: RecoveryTask, commands: &[&str]) -> RecoveryTask {
    commands
        .iter()
        .fold(task, |t, c| t.with_rollback(Action::shell(*c)))
}

fn database() -> SystemRecoveryPlan {
    let assess = shell_all(
        RecoveryTask::new("DB-ASSESS-001", "Database System Assessment", Phase::Assessment)
            .with_description("Assess database system status and damage")
            .with_priority(Priority::Immediate)
            .with_estimate(15)
            .assigned_to("dba_team"),
        &[
            "systemctl status postgresql",
            "ps aux | grep postgres",
            "df -h /var/lib/postgresql",
            "tail -50 /var/log/postgresql/postgresql-*.log",
        ],
    );

    let contain = rollback_all(
        shell_all(
            RecoveryTask::new("DB-CONTAIN-001", "Database Containment", Phase::Containment)
                .with_description("Stop database services and isolate affected systems")
                .with_priority(Priority::Immediate)
                .with_estimate(5)
                .depends_on("DB-ASSESS-001")
                .assigned_to("dba_team"),
            &["systemctl stop postgresql", "systemctl disable postgresql"],
        ),
        &["systemctl enable postgresql", "systemctl start postgresql"],
    );

    let recover = rollback_all(
        shell_all(
            RecoveryTask::new("DB-RECOVER-001", "Database Recovery", Phase::Recovery)
                .with_description("Restore database from backup")
                .with_priority(Priority::Immediate)
                .with_estimate(120)
                .depends_on("DB-CONTAIN-001")
                .assigned_to("dba_team"),
            &[
                "sudo -u postgres pg_restore -d production /backups/latest_backup.sql",
                "systemctl start postgresql",
                "systemctl status postgresql",
            ],
        ),
        &[
            "systemctl stop postgresql",
            "sudo -u postgres dropdb production",
            "sudo -u postgres createdb production",
        ],
    );

    SystemRecoveryPlan::new("RECOVERY-DATABASE-001", "Primary Database", Criticality::Critical)
        .with_task(assess)
        .with_task(contain)
        .with_task(recover)
        .with_backup_location("/backups/database")
        .with_restoration_procedures([
            "Verify backup integrity",
            "Restore to clean environment",
            "Verify data consistency",
        ])
        .with_validation_checks([
            "Database connections working",
            "Sample data queries execute",
            "Application can connect",
            "Performance metrics normal",
        ])
        .with_contact("dba_team", "dba@company.com")
        .with_contact("emergency_contact", "emergency@company.com")
}

fn webapp() -> SystemRecoveryPlan {
    let assess = shell_all(
        RecoveryTask::new("WEB-ASSESS-001", "Web Application Assessment", Phase::Assessment)
            .with_description("Assess web application status and dependencies")
            .with_priority(Priority::High)
            .with_estimate(10)
            .assigned_to("devops_team"),
        &[
            "systemctl status nginx",
            "systemctl status application",
            "netstat -tlnp | grep :80",
            "df -h /var/www",
        ],
    );

    let recover = rollback_all(
        shell_all(
            RecoveryTask::new("WEB-RECOVER-001", "Web Application Recovery", Phase::Recovery)
                .with_description("Restart services and verify functionality")
                .with_priority(Priority::High)
                .with_estimate(30)
                .depends_on("WEB-ASSESS-001")
                .assigned_to("devops_team"),
            &["systemctl restart nginx", "systemctl restart application"],
        )
        .with_action(Action::http_get("http://localhost/health"))
        .with_action(Action::shell("systemctl status nginx")),
        &["systemctl stop nginx", "systemctl stop application"],
    );

    SystemRecoveryPlan::new("RECOVERY-WEBAPP-001", "Web Application", Criticality::High)
        .with_task(assess)
        .with_task(recover)
        .with_backup_location("/backups/webapp")
        .with_restoration_procedures([
            "Deploy application files",
            "Update configuration",
            "Restart services",
        ])
        .with_validation_checks([
            "HTTP responses normal",
            "Application endpoints responsive",
            "Database connectivity",
            "SSL certificates valid",
        ])
        .with_contact("devops_team", "devops@company.com")
        .with_contact("development_team", "dev@company.com")
}

fn network() -> SystemRecoveryPlan {
    let assess = shell_all(
        RecoveryTask::new("NET-ASSESS-001", "Network Assessment", Phase::Assessment)
            .with_description("Assess network infrastructure and connectivity")
            .with_priority(Priority::Immediate)
            .with_estimate(5)
            .assigned_to("network_team"),
        &[
            "ip route show",
            "ping -c 3 8.8.8.8",
            "systemctl status network",
            "iptables -L",
        ],
    );

    let recover = shell_all(
        RecoveryTask::new("NET-RECOVER-001", "Network Services Recovery", Phase::Recovery)
            .with_description("Restart network services and restore connectivity")
            .with_priority(Priority::Immediate)
            .with_estimate(15)
            .depends_on("NET-ASSESS-001")
            .assigned_to("network_team"),
        &[
            "systemctl restart networking",
            "ping -c 3 8.8.8.8",
            "curl -I http://google.com",
        ],
    );

    SystemRecoveryPlan::new("RECOVERY-NETWORK-001", "Network Infrastructure", Criticality::Critical)
        .with_task(assess)
        .with_task(recover)
        .with_backup_location("/backups/network")
        .with_restoration_procedures([
            "Restore network configuration",
            "Restart network services",
            "Verify connectivity",
        ])
        .with_validation_checks([
            "Internet connectivity",
            "Internal network access",
            "DNS resolution",
            "Firewall rules active",
        ])
        .with_contact("network_team", "network@company.com")
        .with_contact("security_team", "security@company.com")
}
