use ldap_siege_runner::prelude::{history, init, run, SiegeCommand};

fn main() -> anyhow::Result<()> {
    let cli = init();

    match cli.command {
        SiegeCommand::Run(args) => {
            run(args)?;
        }
        SiegeCommand::History(args) => history(args)?,
    }

    Ok(())
}
