//! 部署记录
//!
//! 跟踪阶段状态和日志，结束时输出阶段摘要

use tracing::{error, info};

use crate::domain::deploy::{DeployMethod, DeployStage, DeployStatus, DeploymentAttempt, DeploymentPhase, StageStatus};
use crate::domain::workload::Workload;
use crate::error::{DeployError, OpResult};

/// 一次部署调用的阶段与日志记录
pub struct AttemptRecorder {
    pub attempt: DeploymentAttempt,
}

impl AttemptRecorder {
    /// 创建记录并初始化阶段列表 `(name, display_name)`
    pub fn new(workload: &Workload, method: DeployMethod, stages: &[(&str, &str)]) -> Self {
        let mut attempt = DeploymentAttempt::new(&workload.slug, method);
        attempt.stages = stages
            .iter()
            .map(|(name, display)| DeployStage::new(name, display))
            .collect();
        attempt.log_stdout(format!(
            "=== {} deploy for {} ===",
            match method {
                DeployMethod::Manifests => "Manifest",
                DeployMethod::Chart => "Chart",
            },
            workload.slug
        ));
        attempt.log_stdout(format!("Timestamp: {}", attempt.started_at.to_rfc3339()));
        Self { attempt }
    }

    fn stage_mut(&mut self, name: &str) -> Option<&mut DeployStage> {
        self.attempt.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn start(&mut self, name: &str) {
        if let Some(stage) = self.stage_mut(name) {
            stage.start();
            let line = format!(">>> {}", stage.display_name);
            self.attempt.log_stdout(line);
        }
    }

    pub fn finish(&mut self, name: &str, success: bool, message: Option<String>) {
        if let Some(ref message) = message {
            if success {
                self.attempt.log_stdout(message.clone());
            } else {
                self.attempt.log_stderr(message.clone());
            }
        }
        if let Some(stage) = self.stage_mut(name) {
            stage.finish(success, message);
        }
    }

    pub fn skip(&mut self, name: &str, reason: &str) {
        if let Some(stage) = self.stage_mut(name) {
            stage.skip(Some(reason.to_string()));
        }
    }

    pub fn phase(&mut self, phase: DeploymentPhase) {
        self.attempt.enter(phase);
    }

    pub fn stdout(&mut self, content: impl Into<String>) {
        self.attempt.log_stdout(content);
    }

    pub fn stderr(&mut self, content: impl Into<String>) {
        self.attempt.log_stderr(content);
    }

    /// 中止：当前阶段失败，其余未执行阶段跳过
    pub fn abort(&mut self, name: &str, err: DeployError) -> DeployError {
        self.finish(name, false, Some(err.to_string()));
        for stage in &mut self.attempt.stages {
            if stage.status == StageStatus::Pending {
                stage.skip(Some("aborted".to_string()));
            }
        }
        self.attempt.status = DeployStatus::Failed;
        self.attempt.finished_at = Some(chrono::Utc::now());
        self.log_summary();

        error!(
            workload = %self.attempt.workload,
            stage = name,
            error = %err,
            "Deployment aborted"
        );
        err
    }

    /// 阶段摘要
    pub fn log_summary(&mut self) {
        self.attempt.log_stdout("=== Stage Summary ===");
        let lines: Vec<String> = self
            .attempt
            .stages
            .iter()
            .map(|stage| {
                let duration = stage
                    .duration_ms
                    .map(|d| format!("{}ms", d))
                    .unwrap_or_else(|| "-".to_string());
                format!("{} {} ({})", stage.status.icon(), stage.display_name, duration)
            })
            .collect();
        for line in lines {
            info!(workload = %self.attempt.workload, "{}", line);
            self.attempt.log_stdout(line);
        }
    }

    /// 完成记录；成功条件见 `DeploymentAttempt::complete`
    pub fn into_result(mut self) -> OpResult<DeploymentAttempt> {
        self.attempt.complete();
        self.log_summary();

        let attempt = self.attempt;
        info!(
            workload = %attempt.workload,
            attempt = %attempt.id,
            status = attempt.status.as_str(),
            "Deployment finished"
        );

        if attempt.success() {
            return OpResult::ok(attempt);
        }
        let diagnostic = failure_summary(&attempt);
        OpResult::failed(attempt, diagnostic)
    }
}

/// 失败原因：失败的资源、release 或 rollout
fn failure_summary(attempt: &DeploymentAttempt) -> String {
    let mut reasons: Vec<String> = attempt
        .applied
        .iter()
        .filter(|(_, outcome)| !outcome.success)
        .map(|(kind, outcome)| {
            DeployError::Apply {
                kind: kind.to_string(),
                diagnostic: outcome.output.clone(),
            }
            .to_string()
        })
        .collect();
    if let Some(ref release) = attempt.release {
        if !release.success {
            reasons.push(format!("helm release failed: {}", release.output));
        }
    }
    match attempt.rollout {
        Some(ref rollout) if !rollout.success && attempt.release.is_none() => {
            reasons.push(format!("rollout failed: {}", rollout.diagnostic))
        }
        None => reasons.push("rollout was not awaited".to_string()),
        _ => {}
    }
    reasons.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::{RolloutOutcome, StepOutcome};
    use crate::domain::manifest::ResourceKind;

    fn recorder() -> AttemptRecorder {
        AttemptRecorder::new(
            &Workload::new("blog"),
            DeployMethod::Manifests,
            &[("context", "Cluster Context"), ("apply", "Apply Manifests"), ("rollout", "Rollout")],
        )
    }

    #[test]
    fn test_abort_skips_remaining_stages() {
        let mut run = recorder();
        run.start("context");
        let err = run.abort("context", DeployError::connectivity("prod", "connection refused"));

        assert!(err.is_abort());
        let statuses: Vec<StageStatus> = run.attempt.stages.iter().map(|s| s.status.clone()).collect();
        assert_eq!(statuses, vec![StageStatus::Failed, StageStatus::Skipped, StageStatus::Skipped]);
        assert_eq!(run.attempt.status, DeployStatus::Failed);
        assert!(run.attempt.log.iter().any(|l| l.content.contains("✗ Cluster Context")));
    }

    #[test]
    fn test_failed_result_names_failed_kinds() {
        let mut run = recorder();
        run.attempt.applied.insert(ResourceKind::Deployment, StepOutcome::ok("configured"));
        run.attempt
            .applied
            .insert(ResourceKind::Service, StepOutcome::failed("field is immutable"));
        run.attempt.rollout = Some(RolloutOutcome {
            success: true,
            timed_out: false,
            diagnostic: String::new(),
        });

        let result = run.into_result();
        assert!(!result.success);
        assert_eq!(result.diagnostic, "failed to apply service: field is immutable");
        assert_eq!(result.payload.phase, DeploymentPhase::Done);
        assert!(result.payload.finished_at.is_some());
    }
}
