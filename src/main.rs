use batch_shell::cli::Args;
use batch_shell::driver::{Editor, LineSource, PlainReader};
use batch_shell::{Driver, ExecutionEngine, ExecutionMode, logging};
use std::io::IsTerminal;

fn main() {
    if let Err(err) = run_main() {
        eprintln!("batch_shell error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = Args::from_env();
    logging::init_logging(args.log_level)?;

    let mut engine = ExecutionEngine::new(std::io::stdout());

    if let Some(script) = &args.script {
        let mode = if args.parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Serial
        };
        return engine.run_file(script, mode);
    }

    let mut source: Box<dyn LineSource> = if !args.plain && std::io::stdin().is_terminal() {
        Box::new(Editor::new()?)
    } else {
        Box::new(PlainReader::new(std::io::stdin().lock(), std::io::stdout()))
    };
    Driver::new(args.prompt).run(source.as_mut(), &mut engine)
}
