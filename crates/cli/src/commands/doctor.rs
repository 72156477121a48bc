use dingbridge_core::config::{AppConfig, LoadOptions};
use dingbridge_webhook::WebhookTarget;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CheckReport {
    name: String,
    status: String,
    detail: String,
}

pub fn run(json: bool) -> String {
    let checks = collect_checks();
    if json {
        serde_json::to_string(&checks).unwrap_or_else(|error| {
            format!("{{\"status\":\"error\",\"message\":\"{error}\"}}")
        })
    } else {
        render_human(&checks)
    }
}

fn collect_checks() -> Vec<CheckReport> {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(check("config", "ok", "configuration loaded and validated"));
            config
        }
        Err(error) => {
            checks.push(check("config", "fail", format!("configuration invalid: {error}")));
            return checks;
        }
    };

    checks.push(stream_check(&config));
    checks.push(webhook_check(&config));
    checks
}

fn stream_check(config: &AppConfig) -> CheckReport {
    let has_credentials = !config.stream.client_id.trim().is_empty()
        && !config.stream.client_secret.expose_secret().trim().is_empty();
    if has_credentials {
        check("stream", "ok", format!("credentials present for topic {}", config.stream.topic))
    } else {
        check("stream", "warn", "no stream credentials; listener will run in noop mode")
    }
}

fn webhook_check(config: &AppConfig) -> CheckReport {
    if !config.webhook.enabled {
        return check("webhook", "warn", "webhook disabled; send command unavailable");
    }
    match WebhookTarget::from_config(&config.webhook) {
        Ok(_) => check("webhook", "ok", "webhook target resolvable"),
        Err(error) => check("webhook", "fail", format!("webhook target unusable: {error}")),
    }
}

fn check(name: &str, status: &str, detail: impl Into<String>) -> CheckReport {
    CheckReport { name: name.to_owned(), status: status.to_owned(), detail: detail.into() }
}

fn render_human(checks: &[CheckReport]) -> String {
    let mut lines = vec!["dingbridge doctor:".to_owned()];
    for report in checks {
        let marker = match report.status.as_str() {
            "ok" => "✓",
            "warn" => "!",
            _ => "✗",
        };
        lines.push(format!("  {marker} {}: {}", report.name, report.detail));
    }
    lines.join("\n")
}
