use crate::storage::Exchange;
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

/// Question, raw markdown answer and a one-line footer with id and timing
pub fn print_exchange(exchange: &Exchange) {
    println!("{} {}", "Q:".yellow().bold(), exchange.question);
    println!("{}\n{}\n", "A:".green().bold(), exchange.answer);
    println!(
        "{}",
        format!(
            "id {} | {} | {}ms",
            exchange.id, exchange.metadata.model, exchange.metadata.response_time_ms
        )
        .dimmed()
    );
}
