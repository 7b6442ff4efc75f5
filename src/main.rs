#[tokio::main]
async fn main() {
    parley::server::run().await;
}
