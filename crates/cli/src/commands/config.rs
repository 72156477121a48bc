use dingbridge_core::config::{redact_secret, AppConfig, LoadOptions};
use secrecy::ExposeSecret;

/// Renders the effective configuration, with secrets redacted to a short
/// prefix. Precedence is env > file > default; the values shown are the
/// resolved result.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config)
}

fn render(config: &AppConfig) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("stream.client_id", &display_or_unset(&config.stream.client_id)));
    lines.push(render_line(
        "stream.client_secret",
        &redact_secret(config.stream.client_secret.expose_secret()),
    ));
    lines.push(render_line("stream.topic", &config.stream.topic));
    lines.push(render_line("stream.auto_ack", &config.stream.auto_ack.to_string()));
    lines.push(render_line("stream.max_retries", &config.stream.max_retries.to_string()));

    lines.push(render_line("webhook.enabled", &config.webhook.enabled.to_string()));
    lines.push(render_line("webhook.base_url", &display_or_unset(&config.webhook.base_url)));
    lines.push(render_line("webhook.robot", &format!("{:?}", config.webhook.robot).to_lowercase()));
    lines.push(render_line(
        "webhook.secret",
        &config
            .webhook
            .secret
            .as_ref()
            .map(|secret| redact_secret(secret.expose_secret()))
            .unwrap_or_else(|| "(unset)".to_owned()),
    ));
    lines.push(render_line(
        "webhook.access_token",
        &config
            .webhook
            .access_token
            .as_ref()
            .map(|token| redact_secret(token.expose_secret()))
            .unwrap_or_else(|| "(unset)".to_owned()),
    ));
    lines.push(render_line("webhook.timeout_secs", &config.webhook.timeout_secs.to_string()));

    lines.push(render_line("logging.level", &config.logging.level));
    lines.push(render_line("logging.format", &format!("{:?}", config.logging.format).to_lowercase()));

    lines.join("\n")
}

fn render_line(key: &str, value: &str) -> String {
    format!("  {key} = {value}")
}

fn display_or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "(unset)".to_owned()
    } else {
        value.to_owned()
    }
}
