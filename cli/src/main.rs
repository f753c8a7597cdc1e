use clap::{CommandFactory, Parser};
use linkgrade_cli::cmd::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let Some(dir) = args.submissions_dir.clone() else {
        eprintln!("This program takes the directory containing all submissions as argument!\n");
        eprintln!("{}", Args::command().render_usage());
        std::process::exit(1);
    };
    args.exec(dir).await.unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    });
}
