//! Compiler Diagnostics
//!
//! Messages reported by the shading-language compiler are logged, never
//! raised. Each message is printed with a window of source lines around the
//! reported position and a caret under the reported column.

use std::fmt::{self, Write};

/// Severity of a compiler message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
    Info,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        })
    }
}

/// One message from shader module compilation. Positions are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMessage {
    pub kind: MessageKind,
    pub text: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl CompilerMessage {
    #[must_use]
    pub fn from_wgpu(message: &wgpu::CompilationMessage) -> Self {
        let kind = match message.message_type {
            wgpu::CompilationMessageType::Error => MessageKind::Error,
            wgpu::CompilationMessageType::Warning => MessageKind::Warning,
            _ => MessageKind::Info,
        };
        Self {
            kind,
            text: message.message.clone(),
            line: message.location.map(|l| l.line_number),
            column: message.location.map(|l| l.line_position),
        }
    }
}

/// Formats `message` with `context` lines of `source` on each side.
#[must_use]
pub fn format_message(source: &str, message: &CompilerMessage, context: usize) -> String {
    let mut out = format!("{}: {}", message.kind, message.text);
    let Some(line) = message.line.filter(|&l| l > 0) else {
        return out;
    };
    let _ = write!(out, " (line {line}");
    if let Some(column) = message.column {
        let _ = write!(out, ", column {column}");
    }
    out.push(')');

    let lines: Vec<&str> = source.lines().collect();
    let target = line as usize;
    if target > lines.len() {
        return out;
    }
    let first = target.saturating_sub(context).max(1);
    let last = (target + context).min(lines.len());
    let width = last.to_string().len();

    for number in first..=last {
        let marker = if number == target { '>' } else { ' ' };
        let _ = write!(out, "\n{marker} {number:>width$} | {}", lines[number - 1]);
        if number == target
            && let Some(column) = message.column.filter(|&c| c > 0)
        {
            let pad = " ".repeat(column as usize - 1);
            let _ = write!(out, "\n  {:>width$} | {pad}^", "");
        }
    }
    out
}

/// Logs every message at a level matching its severity.
pub fn log_messages(label: &str, source: &str, messages: &[CompilerMessage], context: usize) {
    for message in messages {
        let text = format_message(source, message, context);
        match message.kind {
            MessageKind::Error => log::error!("Shader module '{label}': {text}"),
            MessageKind::Warning => log::warn!("Shader module '{label}': {text}"),
            MessageKind::Info => log::info!("Shader module '{label}': {text}"),
        }
    }
}
