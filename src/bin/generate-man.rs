// Writes the `mosaic` man page to stdout

use std::io;

use clap::CommandFactory;
use mosaic_pipeline::cli::Cli;

fn main() -> io::Result<()> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut stdout = io::stdout();
    man.render(&mut stdout)
}
