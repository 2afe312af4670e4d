//! `workbench prepare`

use anyhow::Result;
use workbench_sandbox::{StdoutSink, EXIT_FAILURE};

use super::open_workspace;
use crate::cli::PrepareArgs;
use crate::orchestrator::PrepareReport;

pub async fn cmd_prepare(project_dir: &str, prepare: &PrepareArgs) -> Result<i32> {
    let (mut project, orchestrator) = open_workspace(project_dir, prepare, None).await?;
    let report = orchestrator.prepare(&mut project, &StdoutSink).await;
    print_summary(&report);
    Ok(exit_code_for(&report))
}

pub(crate) fn print_summary(report: &PrepareReport) {
    let path: Vec<String> = report.states.iter().map(|s| s.to_string()).collect();
    eprintln!("prepare: {}", path.join(" → "));
    if !report.added.is_empty() {
        eprintln!("  added: {}", report.added.join(", "));
    }
    if let Some(code) = report.exit_code {
        eprintln!("  install exit code: {}", code);
    }
    if report.manifest_diverged {
        eprintln!("  warning: package.json in the project is out of date");
    }
}

/// 0 on success, else the install's own non-zero code, else 1.
pub(crate) fn exit_code_for(report: &PrepareReport) -> i32 {
    if report.succeeded() {
        return 0;
    }
    report
        .exit_code
        .filter(|code| *code != 0)
        .unwrap_or(EXIT_FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::PrepareState::*;

    fn report(states: Vec<crate::orchestrator::PrepareState>, exit_code: Option<i32>) -> PrepareReport {
        PrepareReport {
            states,
            added: Vec::new(),
            exit_code,
            manifest_diverged: false,
        }
    }

    #[test]
    fn test_exit_code_for() {
        assert_eq!(exit_code_for(&report(vec![Idle, Scanning, Skip, Done], None)), 0);
        assert_eq!(
            exit_code_for(&report(vec![Idle, Scanning, CacheCheck, Installing, Error], Some(124))),
            124
        );
        assert_eq!(exit_code_for(&report(vec![Idle, Scanning, Error], None)), 1);
    }
}
