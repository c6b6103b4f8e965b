//! systemd unit rendering.
//!
//! The unit never embeds configuration values. It loads the configuration
//! file through `EnvironmentFile=` and refers to `${PORT}` and friends in
//! `ExecStart=`, so its text depends only on host paths and
//! [`ServiceSettings`].

use crate::config::settings::ServiceSettings;
use std::fmt::Write;
use std::path::Path;

/// Renders the unit for `binary` reading its environment from `config`.
pub fn render_unit(binary: &Path, config: &Path, service: &ServiceSettings) -> String {
    let mut exec = quote_arg(&binary.display().to_string());
    for arg in &service.exec_args {
        exec.push(' ');
        exec.push_str(&quote_arg(arg));
    }

    let mut unit = String::new();
    // Writing to a String cannot fail.
    let _ = write!(
        unit,
        "[Unit]\n\
         Description={description}\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         StartLimitIntervalSec={interval}\n\
         StartLimitBurst={burst}\n\
         \n\
         [Service]\n\
         Type=simple\n\
         EnvironmentFile={config}\n\
         ExecStart={exec}\n\
         Restart=on-failure\n\
         RestartSec={restart_sec}\n\
         LimitNOFILE={nofile}\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        description = single_line(&service.description),
        interval = service.start_limit_interval_secs,
        burst = service.start_limit_burst,
        config = config.display(),
        restart_sec = service.restart_sec,
        nofile = service.limit_nofile,
    );
    unit
}

fn single_line(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// Quotes an `ExecStart=` word when it contains whitespace or quotes.
fn quote_arg(arg: &str) -> String {
    let arg = single_line(arg);
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\\' || c == '\'') {
        return arg;
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
