//! Command-line configuration, parsed with [`argh`].

use argh::FromArgs;
use std::path::PathBuf;

#[derive(FromArgs, Debug)]
/// Run commands as child processes, one at a time or in parallel batches.
///
/// Without a script, lines are read from standard input at a prompt. A line
/// `SERIAL <file>` or `PARALLEL <file>` runs the commands in <file>.
pub struct Args {
    #[argh(positional)]
    /// script to run instead of reading commands interactively.
    pub script: Option<PathBuf>,

    #[argh(switch, short = 'p')]
    /// run the script's commands in parallel and wait for them at the end.
    pub parallel: bool,

    #[argh(option, default = "String::from(\"> \")")]
    /// prompt shown before each interactive line. Defaults to "> ".
    pub prompt: String,

    #[argh(switch)]
    /// read standard input line by line even when it is a terminal.
    pub plain: bool,

    #[argh(option, short = 'l')]
    /// log level for diagnostics on stderr: error, warn, info, debug or trace.
    /// Falls back to $BATCH_SHELL_LOG, then warn.
    pub log_level: Option<tracing::Level>,
}

impl Args {
    pub fn from_env() -> Self {
        argh::from_env()
    }
}
