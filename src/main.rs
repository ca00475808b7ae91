mod app;
mod cli;

fn main() {
    let cli = cli::parse();

    if let Err(e) = vidopt::log::init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    std::process::exit(app::run(cli));
}
