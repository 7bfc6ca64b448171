fn main() -> anyhow::Result<()> {
    logchain::run()
}
