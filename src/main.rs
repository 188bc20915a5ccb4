fn main() -> anyhow::Result<()> {
    telecom_desk_lib::run()
}
