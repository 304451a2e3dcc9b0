use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::percent;
use crate::error::{Result, SentinelError};
use crate::settings::EmailSettings;
use crate::store::{RunReport, RunStatus};

const IMPLICIT_TLS_PORT: u16 = 465;

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| SentinelError::Notification(format!("invalid address '{}': {}", address, e)))
}

fn build(settings: &EmailSettings, subject: String, text: String, html: String) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&settings.from)?)
        .subject(subject);
    let mut any = false;
    for to in settings.recipients() {
        builder = builder.to(mailbox(to)?);
        any = true;
    }
    if !any {
        return Err(SentinelError::Notification(
            "email channel has no recipients".to_string(),
        ));
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html),
                ),
        )
        .map_err(|e| SentinelError::Notification(e.to_string()))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn run_message(settings: &EmailSettings, report: &RunReport) -> Result<Message> {
    let verdict = if report.run.status == RunStatus::Completed {
        "passed"
    } else {
        "FAILED"
    };
    let subject = format!("[visual-sentinel] {} {}", report.group_name, verdict);

    let summary = report.run.summary.clone().unwrap_or_default();
    let mut text = format!(
        "Group: {}\nRun: {}\nStatus: {}\nTargets: {} total, {} passed, {} failed, {} errors\n",
        report.group_name,
        report.run.id,
        report.run.status,
        summary.total,
        summary.passed,
        summary.failed,
        summary.errors,
    );
    if let Some(error) = &summary.error {
        text.push_str(&format!("Error: {}\n", error));
    }

    let mut rows = String::new();
    let failed: Vec<_> = report.failed_outcomes().collect();
    if !failed.is_empty() {
        text.push_str("\nTargets needing attention:\n");
    }
    for detail in failed {
        let note = detail.outcome.error.as_deref().unwrap_or("");
        text.push_str(&format!(
            "- {} ({}): {}, similarity {} {}\n",
            detail.target_name,
            detail.target_address,
            detail.outcome.status,
            percent(detail.outcome.similarity),
            note,
        ));
        rows.push_str(&format!(
            "<tr><td>{}</td><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&detail.target_name),
            escape(&detail.target_address),
            escape(&detail.target_address),
            detail.outcome.status,
            percent(detail.outcome.similarity),
            escape(note),
        ));
    }

    let table = if rows.is_empty() {
        String::new()
    } else {
        format!(
            "<table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\
             <tr><th>Target</th><th>Address</th><th>Status</th><th>Similarity</th><th>Error</th></tr>{}</table>",
            rows
        )
    };
    let html = format!(
        "<h2>{} &mdash; {}</h2><p>Run <code>{}</code>: {} total, {} passed, {} failed, {} errors.</p>{}",
        escape(&report.group_name),
        verdict,
        escape(&report.run.id),
        summary.total,
        summary.passed,
        summary.failed,
        summary.errors,
        table,
    );

    build(settings, subject, text, html)
}

pub fn test_message(settings: &EmailSettings) -> Result<Message> {
    build(
        settings,
        "[visual-sentinel] test notification".to_string(),
        "Email notifications are configured correctly.".to_string(),
        "<p>Email notifications are configured correctly.</p>".to_string(),
    )
}

pub async fn send(settings: &EmailSettings, message: Message) -> Result<()> {
    let builder = if settings.port == IMPLICIT_TLS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
    }
    .map_err(|e| SentinelError::Notification(format!("smtp {}: {}", settings.host, e)))?
    .port(settings.port);

    let builder = match (&settings.username, &settings.password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
        _ => builder,
    };

    builder
        .build()
        .send(message)
        .await
        .map_err(|e| SentinelError::Notification(format!("smtp {}: {}", settings.host, e)))?;
    Ok(())
}
