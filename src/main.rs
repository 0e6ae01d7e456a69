#[tokio::main]
async fn main() {
    if let Err(error) = studybuddy::run().await {
        eprintln!("studybuddy: {error}");
        std::process::exit(1);
    }
}
