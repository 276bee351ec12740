use std::process;

mod cli;

#[tokio::main]
async fn main() {
    match cli::run().await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    }
}
