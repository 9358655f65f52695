use clap::{Arg, Command};
use std::io::{self, Write};

/// Writes a member-style fixture: `username,email,dateOfBirth,groups`.
fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Generate a CSV fixture for import runs")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("invalid-every")
                .long("invalid-every")
                .help("Emit an unparseable date every N rows (0 disables)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("duplicate-every")
                .long("duplicate-every")
                .help("Repeat the previous username every N rows (0 disables)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .get_matches();

    let rows: u64 = matches.get_one("rows").copied().unwrap_or(0);
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");
    let invalid_every: u64 = matches.get_one("invalid-every").copied().unwrap_or(0);
    let duplicate_every: u64 = matches.get_one("duplicate-every").copied().unwrap_or(0);

    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(out, "username{delim}email{delim}dateOfBirth{delim}groups")?;

    for i in 1..=rows {
        let id = if duplicate_every > 0 && i > 1 && i % duplicate_every == 0 {
            i - 1
        } else {
            i
        };
        let dob = if invalid_every > 0 && i % invalid_every == 0 {
            "someday".to_string()
        } else {
            format!("19{:02}-{:02}-{:02}", 50 + i % 50, 1 + i % 12, 1 + i % 28)
        };
        writeln!(
            out,
            "user{id:08}{delim}user{id:08}@example.com{delim}{dob}{delim}{}||{}",
            1 + i % 3,
            4 + i % 2
        )?;
        if i % 10_000 == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(())
}
