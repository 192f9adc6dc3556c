use std::env;
use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;
use std::time::Instant;

static START_TIME: OnceLock<Instant> = OnceLock::new();

fn use_color() -> bool {
    static USE_COLOR: OnceLock<bool> = OnceLock::new();
    *USE_COLOR.get_or_init(|| env::var_os("NO_COLOR").is_none())
}

fn is_tty() -> bool {
    static IS_TTY: OnceLock<bool> = OnceLock::new();
    *IS_TTY.get_or_init(|| io::stderr().is_terminal())
}

fn paint(code: &str, text: &str) -> String {
    if use_color() {
        format!("\u{1b}[{}m{}\u{1b}[0m", code, text)
    } else {
        text.to_string()
    }
}

fn dim(text: &str) -> String {
    paint("2", text)
}

fn green(text: &str) -> String {
    paint("32", text)
}

fn cyan(text: &str) -> String {
    paint("36", text)
}

fn yellow(text: &str) -> String {
    paint("33", text)
}

fn red(text: &str) -> String {
    paint("31", text)
}

pub fn header(command: &str, version: &str) {
    START_TIME.get_or_init(Instant::now);
    eprintln!("{}", dim(&format!("dappget {} v{}", command, version)));
    eprintln!();
}

pub fn step(message: &str) {
    if is_tty() {
        eprint!("\r\u{1b}[K{}", dim(message));
        let _ = io::stderr().flush();
    } else {
        eprintln!("{}", dim(message));
    }
}

pub fn step_with_count(message: &str, count: usize) {
    if is_tty() {
        eprint!("\r\u{1b}[K{} {}", dim(message), cyan(&format!("[{}]", count)));
        let _ = io::stderr().flush();
    } else {
        eprintln!("{} {}", message, cyan(&format!("[{}]", count)));
    }
}

pub fn clear_line() {
    if is_tty() {
        eprint!("\r\u{1b}[K");
        let _ = io::stderr().flush();
    }
}

/// A package that will be installed for the first time.
pub fn added(name: &str, version: &str) {
    println!("{} {}@{}", green("+"), name, version);
}

/// A package that will move from `from` to `to`.
pub fn upgraded(name: &str, from: &str, to: &str) {
    println!("{} {}@{} {}", cyan("↑"), name, to, dim(&format!("(from {})", from)));
}

/// A package that will move back from `from` to `to`.
pub fn downgraded(name: &str, from: &str, to: &str) {
    println!("{} {}@{} {}", yellow("↓"), name, to, dim(&format!("(from {})", from)));
}

pub fn unchanged(name: &str, version: &str) {
    println!("{}", dim(&format!("= {}@{}", name, version)));
}

pub fn summary(count: usize) {
    println!();
    let elapsed = START_TIME
        .get()
        .map(|t| t.elapsed().as_secs_f32())
        .unwrap_or(0.0);
    let time_str = if elapsed < 1.0 {
        format!("{:.0}ms", elapsed * 1000.0)
    } else {
        format!("{:.2}s", elapsed)
    };
    let noun = if count == 1 { "package" } else { "packages" };
    println!("{} {} to change {}", count, noun, dim(&format!("[{}]", time_str)));
}

pub fn warn(message: &str) {
    let tag = yellow("warn");
    eprintln!("{} {}", tag, message);
}

pub fn error(message: &str) {
    let tag = red("error");
    eprintln!("{} {}", tag, message);
}

pub fn info(message: &str) {
    println!("{}", message);
}
