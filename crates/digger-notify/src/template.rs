// Email body rendering
//
// A template is plain text with `{{name}}` placeholders. Values are
// HTML-escaped when rendering the HTML part. Unknown placeholders are left
// as they are. The template is scanned once, so a value that itself looks
// like a placeholder is inserted literally.

use chrono::SecondsFormat;
use digger_core::model::ChangeEvent;

/// Built-in HTML body, used when no template file is configured
pub const DEFAULT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .header { background: #0d6efd; color: white; padding: 20px; border-radius: 5px 5px 0 0; }
        .content { background: #f9f9f9; padding: 20px; border-radius: 0 0 5px 5px; }
        td { padding: 4px 12px 4px 0; }
    </style>
</head>
<body>
    <div class="container">
        <div class="header"><h1>IP Address Change</h1></div>
        <div class="content">
            <p>Dear {{recipient}},</p>
            <p>The address of a monitored site has changed.</p>
            <table>
                <tr><td><strong>Hostname</strong></td><td>{{hostname}}</td></tr>
                <tr><td><strong>Port</strong></td><td>{{port}}</td></tr>
                <tr><td><strong>Vendor</strong></td><td>{{entity_name}}</td></tr>
                <tr><td><strong>Old IP</strong></td><td>{{old_ip}}</td></tr>
                <tr><td><strong>New IP</strong></td><td>{{new_ip}}</td></tr>
                <tr><td><strong>Detected</strong></td><td>{{timestamp}}</td></tr>
            </table>
            <p>Please update firewall rules and allow lists that reference the old address.</p>
        </div>
    </div>
</body>
</html>"#;

/// Placeholder values for one change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues {
    pub recipient: String,
    pub hostname: String,
    pub port: String,
    pub entity_name: String,
    pub old_ip: String,
    pub new_ip: String,
    pub timestamp: String,
}

impl TemplateValues {
    pub fn new(event: &ChangeEvent, recipient: &str) -> Self {
        let old_ip = if event.old_ips.is_empty() {
            "(none)".to_string()
        } else {
            event.old_ips_joined()
        };
        Self {
            recipient: recipient.to_string(),
            hostname: event.hostname.clone(),
            port: event.port.to_string(),
            entity_name: event.entity_name.clone(),
            old_ip,
            new_ip: event.new_ip.clone(),
            timestamp: event
                .detected_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn pairs(&self) -> [(&'static str, &str); 7] {
        [
            ("recipient", self.recipient.as_str()),
            ("hostname", self.hostname.as_str()),
            ("port", self.port.as_str()),
            ("entity_name", self.entity_name.as_str()),
            ("old_ip", self.old_ip.as_str()),
            ("new_ip", self.new_ip.as_str()),
            ("timestamp", self.timestamp.as_str()),
        ]
    }
}

/// Fill placeholders, escaping values for HTML
pub fn render_html(template: &str, values: &TemplateValues) -> String {
    render(template, values, escape_html)
}

/// Plain-text alternative body
pub fn render_text(values: &TemplateValues) -> String {
    format!(
        "Dear {},\n\n\
        The address of a monitored site has changed.\n\n\
        Hostname: {}\n\
        Port: {}\n\
        Vendor: {}\n\
        Old IP: {}\n\
        New IP: {}\n\
        Detected: {}\n\n\
        Please update firewall rules and allow lists that reference the old address.\n\n\
        ---\nGenerated by digger",
        values.recipient,
        values.hostname,
        values.port,
        values.entity_name,
        values.old_ip,
        values.new_ip,
        values.timestamp
    )
}

fn render(template: &str, values: &TemplateValues, escape: fn(&str) -> String) -> String {
    let pairs = values.pairs();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let name = &after[..end];
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (end, *value))
        });
        match value {
            Some((end, value)) => {
                out.push_str(&escape(value));
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
