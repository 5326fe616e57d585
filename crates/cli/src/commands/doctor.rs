use huddle_core::config::{AppConfig, LlmProvider, LoadOptions};
use huddle_db::{connect_with_config, DbPool};
use serde::Serialize;

use crate::commands::{block_on, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult::text(exit_code, output)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_llm_settings(&config));
            checks.extend(check_message_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["llm_settings", "database_connectivity", "message_store_schema"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

/// Static inspection only; no request is sent to the provider.
fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let target = match (&llm.provider, llm.base_url.as_deref()) {
        (_, Some(base_url)) => base_url.to_string(),
        (LlmProvider::Gemini, None) => "Gemini default endpoint".to_string(),
        (LlmProvider::OpenAi, None) => "OpenAI default endpoint".to_string(),
        (LlmProvider::Ollama, None) => "<missing base_url>".to_string(),
    };

    let details =
        format!("provider `{}` model `{}` via {target}", llm.provider.as_str(), llm.model);
    if llm.provider == LlmProvider::Ollama && llm.api_key.is_some() {
        return DoctorCheck::new(
            "llm_settings",
            CheckStatus::Warn,
            format!("{details}; api_key is set but ollama does not require one"),
        );
    }
    DoctorCheck::new("llm_settings", CheckStatus::Pass, details)
}

fn check_message_store(config: &AppConfig) -> Vec<DoctorCheck> {
    let outcome = block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new(
                        "message_store_schema",
                        CheckStatus::Skipped,
                        "skipped because the database is unreachable",
                    ),
                ];
            }
        };

        let checks = vec![
            DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Pass,
                format!("connected using `{}`", config.database.url),
            ),
            check_schema(&pool).await,
        ];
        pool.close().await;
        checks
    });

    outcome.unwrap_or_else(|error| {
        vec![DoctorCheck::new("database_connectivity", CheckStatus::Fail, error)]
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let table: Result<Option<String>, sqlx::Error> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'chat_message'",
    )
    .fetch_optional(pool)
    .await;

    match table {
        Ok(Some(_)) => {
            match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_message")
                .fetch_one(pool)
                .await
            {
                Ok(count) => DoctorCheck::new(
                    "message_store_schema",
                    CheckStatus::Pass,
                    format!("chat_message table present with {count} messages"),
                ),
                Err(error) => DoctorCheck::new(
                    "message_store_schema",
                    CheckStatus::Fail,
                    format!("chat_message table unreadable: {error}"),
                ),
            }
        }
        Ok(None) => DoctorCheck::new(
            "message_store_schema",
            CheckStatus::Warn,
            "chat_message table missing; run `huddle migrate`",
        ),
        Err(error) => DoctorCheck::new(
            "message_store_schema",
            CheckStatus::Fail,
            format!("schema lookup failed: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
