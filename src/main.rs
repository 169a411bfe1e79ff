fn main() {
    use clap::Parser;
    use serialscrape::progress::{ConsoleProgress, NoProgress, ProgressSink};
    use std::error::Error;
    let args = serialscrape::cli::Args::parse();
    let console = (!args.quiet).then(ConsoleProgress::new);
    if let Err(e) =
        serialscrape::logging::init(args.verbose, args.quiet, console.as_ref().map(ConsoleProgress::bar))
    {
        eprintln!("{:#}", e);
    }
    let sink: &dyn ProgressSink = match &console {
        Some(console) => console,
        None => &NoProgress,
    };
    if let Err(e) = serialscrape::cli::run(&args, sink) {
        eprintln!("{}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
