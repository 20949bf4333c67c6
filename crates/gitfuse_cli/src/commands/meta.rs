//! Shell completions and man pages.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

use crate::Cli;

const BIN_NAME: &str = "gitfuse";

/// Layout of the mounted tree, spliced into the main page after DESCRIPTION.
const FILESYSTEM_SECTION: &str = r#".SH FILESYSTEM
.TP
\fI<mount>/<owner>\fR
One directory per configured user or organization, present even before its first listing.
.TP
\fI<mount>/<owner>/<repo>\fR
The default branch's files. Its modification time is the repository's last push or update.
.TP
\fI<mount>/<owner>/<repo>/branches/<name>\fR
The tree of each branch. A \fB/\fR in a branch name appears as \fB%2F\fR and a \fB%\fR as \fB%25\fR.
.TP
\fI<mount>/<owner>/<repo>/tags/<name>\fR
The tree of each tag, named like branches. Ref directories are dated by their commit.
.PP
A file in the repository named \fBbranches\fR or \fBtags\fR hides the directory of the same name.
Every write fails with EROFS.
"#;

fn completion_script(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut out = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut out);
    out
}

fn main_man_page() -> std::io::Result<Vec<u8>> {
    let man = clap_mangen::Man::new(Cli::command());
    let mut out = Vec::new();
    man.render_title(&mut out)?;
    man.render_name_section(&mut out)?;
    man.render_synopsis_section(&mut out)?;
    man.render_description_section(&mut out)?;
    out.write_all(FILESYSTEM_SECTION.as_bytes())?;
    man.render_options_section(&mut out)?;
    man.render_subcommands_section(&mut out)?;
    man.render_extra_section(&mut out)?;
    man.render_version_section(&mut out)?;
    Ok(out)
}

/// Write one page per subcommand, then replace the main page with ours.
fn write_man_pages(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    clap_mangen::generate_to(Cli::command(), dir)?;
    std::fs::write(dir.join(format!("{BIN_NAME}.1")), main_man_page()?)
}

pub(crate) fn handle_completions(
    shell: Shell,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let path = clap_complete::generate_to(shell, &mut Cli::command(), BIN_NAME, &dir)?;
            println!("Wrote {} completions to {}", shell, path.display());
        }
        None => std::io::stdout().write_all(&completion_script(shell))?,
    }
    Ok(())
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            write_man_pages(&dir)?;
            println!("Generated man pages in: {}", dir.display());
        }
        None => std::io::stdout().write_all(&main_man_page()?)?,
    }
    Ok(())
}
