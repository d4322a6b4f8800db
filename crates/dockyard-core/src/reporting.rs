use anyhow::{Context, Result};
use std::path::Path;

use serde::Serialize;

use crate::domain::{BuildStatus, FatalDiagnostic, PipelineReport, PushOutcome};

/// Status written in place of a report when a run aborts.
pub const ABORTED_STATUS: &str = "aborted";

#[derive(Serialize)]
struct AbortedRun<'a> {
    overall_status: &'static str,
    error: &'a FatalDiagnostic,
}

/// Write the run report as pretty JSON.
pub fn write_report_json(path: &Path, report: &PipelineReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize pipeline report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the Markdown summary for the CI job page.
pub fn render_report_md(report: &PipelineReport) -> String {
    let mut out = String::new();
    out.push_str("# Release Summary\n\n");
    out.push_str(&format!(
        "- trigger: {} `{}` ({})\n- intent: {}\n- push eligible: {}\n- tags: {}\n- status: **{}**\n\n",
        report.trigger.kind,
        report.trigger.git_ref,
        report.trigger.sha,
        report.intent_reason,
        if report.push_eligible { "yes" } else { "no" },
        report
            .tags
            .iter()
            .map(|t| format!("`{}`", t))
            .collect::<Vec<_>>()
            .join(", "),
        report.overall_status,
    ));

    out.push_str("## Builds\n");
    out.push_str("| variant | tag | status | push | detail |\n");
    out.push_str("|---|---|---|---|---|\n");
    for result in &report.results {
        let push = report
            .pushes
            .iter()
            .find(|p| p.variant() == result.variant && p.tag() == result.tag);
        let push_label = push.map(|p| p.label()).unwrap_or("-");
        let detail = match (result.status, &result.error, push) {
            (_, _, Some(PushOutcome::Pushed { reference, .. })) => format!("`{}`", reference),
            (_, _, Some(PushOutcome::Failed { error, .. })) => error.to_string(),
            (BuildStatus::Succeeded, _, _) => String::new(),
            (_, Some(error), _) => error.to_string(),
            (_, None, _) => String::new(),
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            result.variant,
            result.tag,
            result.status,
            push_label,
            detail.replace('|', "\\|").replace('\n', " ")
        ));
    }
    out.push('\n');

    out.push_str(&format!(
        "- succeeded: {}\n- failed: {}\n- skipped: {}\n- pushed: {}\n- duration: {} ms\n",
        report.succeeded_count(),
        report.failed_count(),
        report.skipped_count(),
        report.pushed.len(),
        report.duration_ms
    ));
    out
}

/// Write the Markdown summary (e.g. to `$GITHUB_STEP_SUMMARY`).
pub fn write_report_md(path: &Path, report: &PipelineReport) -> Result<()> {
    let md = render_report_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the record of an aborted run as pretty JSON.
pub fn render_fatal_json(diagnostic: &FatalDiagnostic) -> Result<String> {
    serde_json::to_string_pretty(&AbortedRun {
        overall_status: ABORTED_STATUS,
        error: diagnostic,
    })
    .context("serialize fatal diagnostic")
}

/// Write the record of an aborted run where the report would have gone.
pub fn write_fatal_json(path: &Path, diagnostic: &FatalDiagnostic) -> Result<()> {
    let content = render_fatal_json(diagnostic)?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BuildResult, ErrorDescriptor, ErrorKind, FatalKind, OverallStatus, PushedImage, Trigger,
    };
    use chrono::{DateTime, Utc};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn sample() -> PipelineReport {
        let at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        let mut pushed = BTreeSet::new();
        pushed.insert(PushedImage::new("cpu", "v3.1.0"));
        PipelineReport {
            run_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("valid UUID"),
            trigger: Trigger::tag_push("refs/tags/v3.1.0", "abc1234def"),
            intent_reason: "tag push 'v3.1.0'".to_string(),
            push_eligible: true,
            tags: vec!["v3.1.0".to_string()],
            results: vec![
                BuildResult::succeeded("cpu", "v3.1.0", "nrdg/afq:v3.1.0", 12),
                BuildResult::failed(
                    "gpu",
                    "v3.1.0",
                    ErrorDescriptor::new(ErrorKind::BuildPrimitive, "exit status 1"),
                    7,
                ),
            ],
            pushes: vec![
                PushOutcome::Pushed {
                    variant: "cpu".into(),
                    tag: "v3.1.0".into(),
                    reference: "docker.io/nrdg/afq:v3.1.0".into(),
                },
                PushOutcome::NotBuilt {
                    variant: "gpu".into(),
                    tag: "v3.1.0".into(),
                    status: BuildStatus::Failed,
                },
            ],
            pushed,
            overall_status: OverallStatus::PartialFailure,
            timeline: vec![],
            registry_digest: "abc".to_string(),
            started_at: at,
            finished_at: at,
            duration_ms: 20,
        }
    }

    #[test]
    fn report_json_has_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_report_json(&path, &sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let obj = raw.as_object().expect("report object");
        for key in ["run_id", "trigger", "results", "pushes", "pushed", "overall_status"] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(raw["overall_status"], "partial_failure");
        assert_eq!(raw["trigger"]["ref"], "refs/tags/v3.1.0");
        assert_eq!(raw["results"][1]["error"]["kind"], "build_primitive");
    }

    #[test]
    fn fatal_json_carries_kind_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let diagnostic = FatalDiagnostic::new(FatalKind::Config, "worker_limit must be at least 1");
        write_fatal_json(&path, &diagnostic).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["overall_status"], "aborted");
        assert_eq!(raw["error"]["kind"], "config");
        assert_eq!(raw["error"]["message"], "worker_limit must be at least 1");
    }

    #[test]
    fn report_markdown_render_is_stable() {
        let actual = render_report_md(&sample());
        let expected = "# Release Summary\n\n\
- trigger: tag_push `refs/tags/v3.1.0` (abc1234def)\n\
- intent: tag push 'v3.1.0'\n\
- push eligible: yes\n\
- tags: `v3.1.0`\n\
- status: **partial_failure**\n\n\
## Builds\n\
| variant | tag | status | push | detail |\n\
|---|---|---|---|---|\n\
| cpu | v3.1.0 | succeeded | pushed | `docker.io/nrdg/afq:v3.1.0` |\n\
| gpu | v3.1.0 | failed | not_built | build_primitive: exit status 1 |\n\n\
- succeeded: 1\n- failed: 1\n- skipped: 0\n- pushed: 1\n- duration: 20 ms\n";
        assert_eq!(actual, expected);
    }
}
