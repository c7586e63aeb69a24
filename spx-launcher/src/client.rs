//! CLI side of the control socket

use std::path::Path;

use spx_core::{Command, ReadinessState, Response, StatusReport};

type CliResult = Result<(), Box<dyn std::error::Error>>;

async fn send(socket: &Path, cmd: Command) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let response: Response = spx_socket::request(socket, &cmd).await.map_err(|e| {
        format!(
            "launcher is not reachable at {} ({}); start it with `spx-launcher run`",
            socket.display(),
            e
        )
    })?;
    match response {
        Response::Ok { data } => Ok(data),
        Response::Error { message } => Err(format!("Error: {message}").into()),
    }
}

/// Send `cmd` and print the string it answers with, if any.
pub async fn print_message(socket: &Path, cmd: Command) -> CliResult {
    match send(socket, cmd).await? {
        serde_json::Value::String(message) => println!("{message}"),
        serde_json::Value::Null => {}
        other => println!("{other}"),
    }
    Ok(())
}

pub async fn status(socket: &Path, json: bool) -> CliResult {
    let data = send(socket, Command::Status).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }
    let report: StatusReport = serde_json::from_value(data)?;
    print!("{}", format_status(&report));
    Ok(())
}

pub async fn logs(socket: &Path, tail: Option<usize>) -> CliResult {
    let data = send(socket, Command::Logs { tail }).await?;
    let lines: Vec<String> = serde_json::from_value(data)?;
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

pub async fn open_url(url: &str) -> CliResult {
    spx_launcher::desktop::open(url)?;
    Ok(())
}

pub fn set_server_path(path: &Path) -> CliResult {
    let config_file =
        spx_launcher::paths::config_file().ok_or("Could not determine the user config directory")?;
    let binary = spx_launcher::process::remember_server_path(&config_file, path)?;
    println!("Server binary: {}", binary.display());
    println!("Saved to {}", config_file.display());
    Ok(())
}

pub fn format_uptime(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        out.push_str(&format!("{:<10} {}\n", label, value));
    };

    line("Status:", report.status_message.clone());
    line("State:", format!("{} ({})", report.run_state, report.readiness));
    let port_note = if report.port_resolved { "" } else { " (default)" };
    line("Port:", format!("{}{}", report.control_port, port_note));
    line("Uptime:", format_uptime(report.uptime_secs));

    if let Some(identity) = &report.identity {
        if let Some(version) = &identity.version {
            line("Version:", version.clone());
        }
        if let Some(host_id) = &identity.host_id {
            line("Host ID:", host_id.clone());
        }
        if let Some(days) = identity.license_days_remaining {
            line("License:", format!("{days} days remaining"));
        }
    } else if report.readiness == ReadinessState::Exhausted {
        line("Server:", "not answering its status endpoint".to_string());
    }

    line(
        "Logs:",
        format!("{} lines ({} dropped)", report.log_lines, report.logs_dropped),
    );
    out
}
