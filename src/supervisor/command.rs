// Launch command for a Minecraft server process.

use crate::models::Server;

/// Splits an argument string on whitespace; double quotes group words.
pub fn split_args(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_token = false;
    for c in s.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                has_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_token {
                    out.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        out.push(current);
    }
    out
}

/// Program and arguments:
/// `java [java_arguments] -Xms{min}M -Xmx{max}M -jar {executable} nogui [minecraft_arguments]`.
/// An executable starting with `@` is a Java argument file (installer-based loaders) and
/// is passed without `-jar`.
pub fn build(server: &Server, default_java: &str) -> (String, Vec<String>) {
    let program = server
        .java_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(default_java)
        .to_string();

    let mut args = split_args(&server.java_arguments);
    args.push(format!("-Xms{}M", server.min_ram));
    args.push(format!("-Xmx{}M", server.max_ram));
    if server.executable.starts_with('@') {
        args.push(server.executable.clone());
    } else {
        args.push("-jar".into());
        args.push(server.executable.clone());
    }
    args.push("nogui".into());
    args.extend(split_args(&server.minecraft_arguments));
    (program, args)
}
