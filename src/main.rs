use clap::Parser;
use duosync::cli::{run, Cli};

#[tokio::main]
async fn main() {
	duosync::logging::init_tracing();

	let cli = Cli::parse();
	if let Err(e) = run(cli).await {
		eprintln!("duosync: {}", e);
		std::process::exit(1);
	}
}

// vim: ts=4
