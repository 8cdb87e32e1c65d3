#[tokio::main]
async fn main() {
    if let Err(e) = cxr_report::run().await {
        eprintln!("cxr-report: {e}");
        std::process::exit(1);
    }
}
