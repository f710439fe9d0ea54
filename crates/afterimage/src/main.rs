mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Effects) => run::list_effects(),
        Some(Command::Render(render)) => run::render(&cli.run, &render),
        None => run::preview(&cli.run),
    }
}
