// Human-facing progress lines on stdout; structured diagnostics go through tracing
use colored::Colorize;

pub fn step(msg: &str) {
    println!("{}", format!("→ {}", msg).magenta());
}

pub fn note(msg: &str) {
    println!("{}", format!("ℹ {}", msg).blue());
}

pub fn ok(msg: &str) {
    println!("{}", format!("✓ {}", msg).green());
}

pub fn caution(msg: &str) {
    println!("{}", format!("⚠ {}", msg).yellow());
}

pub fn fail(msg: &str) {
    println!("{}", format!("✗ {}", msg).red());
}

pub fn heading(msg: &str) {
    println!("{}", msg.white().bold());
}

/// Print captured program output, indented
pub fn block(text: &str) {
    for line in text.trim_end().lines() {
        println!("    {}", line);
    }
}
