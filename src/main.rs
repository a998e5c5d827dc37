use clap::Parser;
use srcbuild::cli::{handle_build, handle_detect, handle_locate, handle_show, CliArgs, Commands};
use srcbuild::logging::{init_logging, level_from_flags};
use srcbuild::settings::Settings;
use srcbuild::VERSION;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging(level_from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("srcbuild v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let settings = Settings::from_env();
    let exit_code = match &args.command {
        Commands::Detect(detect_args) => handle_detect(detect_args, &settings),
        Commands::Build(build_args) => handle_build(build_args, &settings, args.quiet).await,
        Commands::Locate(locate_args) => handle_locate(locate_args, &settings),
        Commands::Show(show_args) => handle_show(show_args, &settings),
    };

    std::process::exit(exit_code);
}
