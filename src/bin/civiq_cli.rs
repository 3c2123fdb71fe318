//!
//! civiq CLI binary
//! ----------------
//! Offline helper for operators: evaluate a permission check against a permission table,
//! print the effective table, or produce Argon2 hashes for the users file.

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use civiq::identity::{hash_password, CommuneId, Permission, PermissionEvaluator, Role, RolePermissionTable, ScopePolicy, UserContext};
use civiq::tprintln;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} check <role> <permission> [--user-commune <id>] [--scope <id>] [--permissions <file>] [--strict-zero]\n  {program} table [--permissions <file>]\n  {program} hash-password [<password> | -]\n\nFlags:\n  --user-commune <id>      Commune of the user being checked (omit for none)\n  --scope <id>             Commune the permission is requested for (omit for unscoped)\n  --permissions <file>     JSON role -> permissions table (default: built-in table)\n  --strict-zero            Treat commune id 0 as a real id instead of \"unscoped\"\n  -h, --help               Show this help\n\nhash-password reads the password from the first line of stdin when no password (or -) is given.\n\nExamples:\n  {program} check agent_commune manage_signalements --user-commune 5 --scope 7\n  {program} table --permissions /etc/civiq/permissions.json\n  printf '%s\\n' \"$PW\" | {program} hash-password"
    );
}

#[derive(Debug, Default)]
struct Flags {
    positional: Vec<String>,
    user_commune: Option<u64>,
    scope: Option<u64>,
    permissions: Option<PathBuf>,
    strict_zero: bool,
}

fn parse_flags(args: &[String]) -> Result<Flags> {
    let mut f = Flags::default();
    let mut i = 0;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--user-commune" | "--scope" | "--permissions" => {
                let v = args.get(i + 1).ok_or_else(|| anyhow!("missing value for {}", a))?;
                match a {
                    "--user-commune" => f.user_commune = Some(v.parse().with_context(|| format!("invalid commune id '{}'", v))?),
                    "--scope" => f.scope = Some(v.parse().with_context(|| format!("invalid commune id '{}'", v))?),
                    _ => f.permissions = Some(PathBuf::from(v)),
                }
                i += 2;
                continue;
            }
            "--strict-zero" => f.strict_zero = true,
            _ if a.starts_with("--") => return Err(anyhow!("unknown flag {}", a)),
            _ => f.positional.push(a.to_string()),
        }
        i += 1;
    }
    Ok(f)
}

fn load_table(path: Option<&PathBuf>) -> Result<RolePermissionTable> {
    match path {
        Some(p) => {
            tprintln!("loading permission table from {}", p.display());
            RolePermissionTable::load(p).map_err(|e| anyhow!(e))
        }
        None => Ok(RolePermissionTable::builtin()),
    }
}

fn cmd_check(f: &Flags) -> Result<bool> {
    let [role, permission] = f.positional.as_slice() else {
        return Err(anyhow!("check expects <role> <permission>"));
    };
    let role: Role = role.parse().map_err(|e| anyhow!("{}", e))?;
    let permission: Permission = permission.parse().map_err(|e| anyhow!("{}", e))?;
    let evaluator = PermissionEvaluator::new(load_table(f.permissions.as_ref())?)
        .with_policy(ScopePolicy { strict_zero: f.strict_zero });
    let user = UserContext::new("cli", role, f.user_commune.map(CommuneId));
    let decision = evaluator.decide(Some(&user), permission, f.scope.map(CommuneId));
    println!("{} ({})", if decision.allowed { "allowed" } else { "denied" }, decision.reason.as_str());
    Ok(decision.allowed)
}

/// First line of `input`, without the line terminator.
fn read_password(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(anyhow!("empty password"));
    }
    Ok(password.to_string())
}

fn cmd_hash_password(f: &Flags) -> Result<()> {
    let password = match f.positional.as_slice() {
        [] => read_password(io::stdin().lock())?,
        [p] if p == "-" => read_password(io::stdin().lock())?,
        [p] => p.clone(),
        _ => return Err(anyhow!("hash-password expects at most one <password>")),
    };
    println!("{}", hash_password(&password).map_err(|e| anyhow!(e))?);
    Ok(())
}

fn cmd_table(f: &Flags) -> Result<()> {
    let table = load_table(f.permissions.as_ref())?;
    for (role, perms) in table.iter() {
        let names: Vec<&str> = perms.iter().map(|p| p.as_str()).collect();
        println!("{:<14} {}", role.as_str(), if names.is_empty() { "-".to_string() } else { names.join(", ") });
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(|s| s.as_str()).unwrap_or("civiq_cli");
    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage(program);
        return Ok(());
    }
    let flags = parse_flags(&args[2..])?;
    match args[1].as_str() {
        "check" => {
            if !cmd_check(&flags)? {
                std::process::exit(1);
            }
            Ok(())
        }
        "table" => cmd_table(&flags),
        "hash-password" => cmd_hash_password(&flags),
        other => {
            print_usage(program);
            Err(anyhow!("unknown command '{}'", other))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_first_stdin_line() {
        let pw = read_password(io::Cursor::new("s3cret pass\r\nignored\n")).unwrap();
        assert_eq!(pw, "s3cret pass");
        assert_eq!(read_password(io::Cursor::new("no-newline")).unwrap(), "no-newline");
    }

    #[test]
    fn empty_stdin_is_rejected() {
        assert!(read_password(io::Cursor::new("")).is_err());
        assert!(read_password(io::Cursor::new("\n")).is_err());
    }
}
