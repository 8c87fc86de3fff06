//! Prefixed console output

use colored::Colorize;
use std::fmt::Display;

const PREFIX: &str = "[galaxy]";

pub fn info(message: impl Display) {
    println!("{} {}", PREFIX.cyan(), message);
}

pub fn warn(message: impl Display) {
    eprintln!("{} {}", PREFIX.cyan(), message.to_string().yellow());
}

pub fn error(message: impl Display) {
    eprintln!("{} {}", PREFIX.cyan(), message.to_string().red());
}
