//! Colored terminal reporting
//!
//! Uses owo-colors. Everything the pipeline has to say goes through here;
//! failures are returned to the caller, never printed and dropped.

use owo_colors::OwoColorize;

#[derive(Clone, Copy)]
enum Tone {
    Action,
    Success,
    Skip,
    Info,
    Warning,
    Error,
}

fn emit(tone: Tone, message: &str) {
    match tone {
        Tone::Action => println!("{} {}", "==>".blue().bold(), message.bold()),
        Tone::Success => println!("{} {}", "==>".green().bold(), message.green()),
        Tone::Skip => println!("{} {}", "==>".dimmed(), message.dimmed()),
        Tone::Info => println!("{} {}", "::".cyan(), message),
        Tone::Warning => eprintln!("{} {}", "warning:".yellow().bold(), message.yellow()),
        Tone::Error => eprintln!("{} {}", "error:".red().bold(), message.red()),
    }
}

/// Header for a top-level step, e.g. "==> Fetching https://..."
pub fn action(message: &str) {
    emit(Tone::Action, message);
}

/// Header for one asset of a manifest, e.g. "(2/5) libraries"
pub fn action_numbered(current: usize, total: usize, message: &str) {
    let counter = format!("({}/{})", current, total);
    println!("{} {}", counter.cyan(), message.bold());
}

/// Indented, dimmed line under the current step.
pub fn detail(message: &str) {
    println!("     {}", message.dimmed());
}

pub fn success(message: &str) {
    emit(Tone::Success, message);
}

pub fn info(message: &str) {
    emit(Tone::Info, message);
}

/// Goes to stderr.
pub fn warning(message: &str) {
    emit(Tone::Warning, message);
}

/// Goes to stderr.
pub fn error(message: &str) {
    emit(Tone::Error, message);
}

/// Work that was not needed, e.g. an already verified download.
pub fn skip(message: &str) {
    emit(Tone::Skip, message);
}
