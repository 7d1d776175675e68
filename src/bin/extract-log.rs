// ABOUTME: extract-log binary, exits 0 on success and 1 if every change was ignored
// ABOUTME: Exits 2 on runtime errors and 3 on usage or config errors

use std::process::ExitCode;

use osm_changefeed::commands::{self, extract_log};

#[tokio::main]
async fn main() -> ExitCode {
    let args: extract_log::ExtractLogArgs = match commands::parse_args(3) {
        Ok(args) => args,
        Err(code) => return code,
    };
    args.common.init_logging();

    match extract_log::run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            commands::report(&e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
