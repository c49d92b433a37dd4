fn main() -> anyhow::Result<()> {
    netledger_lib::run()
}
