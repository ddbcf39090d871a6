#[cfg(feature = "esp32")]
mod esp;
mod fetch;
mod gree;
#[cfg(not(feature = "esp32"))]
mod host;
#[cfg(feature = "esp32")]
mod ir;
mod ntp;
#[cfg(not(feature = "esp32"))]
mod retention_file;

#[cfg(not(feature = "esp32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}

#[cfg(feature = "esp32")]
fn main() -> anyhow::Result<()> {
    esp::run()
}
