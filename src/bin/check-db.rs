// ABOUTME: check-db binary
// ABOUTME: Exit 0 on success, 2 on runtime errors, 3 on usage or config errors

use std::process::ExitCode;

use osm_changefeed::commands::{self, check_db};

#[tokio::main]
async fn main() -> ExitCode {
    let args: check_db::CheckDbArgs = match commands::parse_args(3) {
        Ok(args) => args,
        Err(code) => return code,
    };
    args.common.init_logging();

    match check_db::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::report(&e);
            ExitCode::from(commands::exit_code(&e))
        }
    }
}
