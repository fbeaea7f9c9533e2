use std::process;

use wgconf_edit_core::ExitCode;

fn main() {
    match wgconf_cli::run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("wgconf error: {err:#}");
            process::exit(ExitCode::Io as i32);
        }
    }
}
