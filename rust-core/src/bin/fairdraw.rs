use fairdraw_core::config::EngineConfig;
use fairdraw_core::ledger::InvalidateOutcome;
use fairdraw_core::store::JsonFileStore;
use fairdraw_core::types::{Participant, ParticipantId, ParticipantStatus, WinnerId};
use fairdraw_core::verify::{signed_public_proof, ProofSigner};
use fairdraw_core::{verify_lottery_result, LotteryEngine};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: fairdraw [--config FILE] [--data-dir DIR] <command> [--flag value ...]

commands:
  register   --name N --phone P --card C
  status     --participant ID --status pending|approved|rejected --admin ID [--notes TEXT]
  draw       --winners N [--include-previous] [--seed-out FILE] [--disclose-seed]
  invalidate --winner ID --admin ID --reason TEXT
  delete     --winner ID --admin ID
  reroll     --winner ID --admin ID --reason TEXT [--seed-out FILE]
  verify     --seed HEX --hash HEX --snapshot FILE --winners ID,ID,...
  stats
  draws
  serve      [--listen ADDR]";

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut config_path: Option<String> = None;
    let mut data_dir_override: Option<String> = None;
    let mut command: Option<String> = None;
    let mut flags: HashMap<String, String> = HashMap::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next(),
            "--data-dir" => data_dir_override = args.next(),
            "--include-previous" | "--disclose-seed" => {
                flags.insert(arg.trim_start_matches("--").to_string(), "true".into());
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            flag if flag.starts_with("--") => {
                let value = args.next().ok_or(format!("missing value for {}", flag))?;
                flags.insert(flag.trim_start_matches("--").to_string(), value);
            }
            cmd if command.is_none() => command = Some(cmd.to_string()),
            other => return Err(format!("unexpected argument {}\n{}", other, USAGE)),
        }
    }

    let mut config = match config_path {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = data_dir_override {
        config.data_dir = dir;
    }
    init_logging(&config.log_filter);

    let command = command.ok_or_else(|| USAGE.to_string())?;
    if command == "verify" {
        return cmd_verify(&flags);
    }

    let store = JsonFileStore::open(&config.data_dir, config.max_participants)
        .map_err(|e| e.to_string())?;
    let engine = LotteryEngine::with_config(store, &config);

    match command.as_str() {
        "register" => {
            let p = Participant::new(
                required(&flags, "name")?,
                required(&flags, "phone")?,
                required(&flags, "card")?,
            );
            let id = engine.register_participant(p).map_err(|e| e.to_string())?;
            println!("{}", id);
        }
        "status" => {
            let id: ParticipantId = parse_flag(&flags, "participant")?;
            let status: ParticipantStatus = required(&flags, "status")?.parse()?;
            let admin = parse_flag(&flags, "admin")?;
            engine
                .update_participant_status(id, status, admin, flags.get("notes").cloned())
                .map_err(|e| e.to_string())?;
        }
        "draw" => {
            let winners: usize = parse_flag(&flags, "winners")?;
            let include_previous = flags.contains_key("include-previous");
            let result = engine
                .conduct_lottery(winners, !include_previous)
                .map_err(|e| e.to_string())?;

            let signer = ProofSigner::from_config(&config)?;
            let mut out = serde_json::json!({
                "proof": signed_public_proof(&result, signer.as_ref()),
                "eligible_snapshot": result.eligible_snapshot,
                "winners": result.winners.iter().map(|w| serde_json::json!({
                    "winner_id": w.winner_id,
                    "participant_id": w.participant.id,
                    "full_name": w.participant.full_name,
                })).collect::<Vec<_>>(),
            });
            keep_seed(&flags, result.seed.expose(), &mut out)?;
            print_json(&out)?;
        }
        "invalidate" => {
            let winner: WinnerId = parse_flag(&flags, "winner")?;
            let admin = parse_flag(&flags, "admin")?;
            let outcome = engine
                .invalidate_winner(winner, admin, required(&flags, "reason")?)
                .map_err(|e| e.to_string())?;
            match outcome {
                InvalidateOutcome::Invalidated => println!("invalidated {}", winner),
                InvalidateOutcome::AlreadyInvalid => println!("{} was already invalid", winner),
            }
        }
        "delete" => {
            let winner: WinnerId = parse_flag(&flags, "winner")?;
            let admin = parse_flag(&flags, "admin")?;
            let row = engine.delete_winner(winner, admin).map_err(|e| e.to_string())?;
            print_json(&row)?;
        }
        "reroll" => {
            let winner: WinnerId = parse_flag(&flags, "winner")?;
            let admin = parse_flag(&flags, "admin")?;
            let outcome = engine
                .reroll_winner(winner, admin, required(&flags, "reason")?)
                .map_err(|e| e.to_string())?;
            let replacement = &outcome.replacement;
            let signer = ProofSigner::from_config(&config)?;
            let mut out = serde_json::json!({
                "replaced": outcome.replaced,
                "proof": signed_public_proof(replacement, signer.as_ref()),
                "eligible_snapshot": replacement.eligible_snapshot,
                "new_winner_id": replacement.winners[0].winner_id,
                "new_participant_id": replacement.winners[0].participant.id,
            });
            keep_seed(&flags, replacement.seed.expose(), &mut out)?;
            print_json(&out)?;
        }
        "stats" => print_json(&engine.lottery_statistics().map_err(|e| e.to_string())?)?,
        "draws" => print_json(&engine.draw_records().map_err(|e| e.to_string())?)?,
        "serve" => serve(engine, flags.get("listen").cloned().unwrap_or(config.http.listen_addr))?,
        other => return Err(format!("unknown command {}\n{}", other, USAGE)),
    }
    Ok(())
}

#[cfg(feature = "server")]
fn serve(engine: LotteryEngine<JsonFileStore>, listen: String) -> Result<(), String> {
    use std::sync::Arc;
    let (addr, handle) = fairdraw_core::http::start_http_server(&listen, Arc::new(engine))?;
    tracing::info!(%addr, "serving public draw records");
    handle.join().map_err(|_| "http server thread panicked".to_string())
}

#[cfg(not(feature = "server"))]
fn serve(_engine: LotteryEngine<JsonFileStore>, _listen: String) -> Result<(), String> {
    Err("Build with --features server to enable the HTTP surface.".into())
}

fn cmd_verify(flags: &HashMap<String, String>) -> Result<(), String> {
    let seed = required(flags, "seed")?;
    let hash = required(flags, "hash")?;
    let snapshot_raw = fs::read_to_string(required(flags, "snapshot")?).map_err(|e| format!("{}", e))?;
    // Either a bare id array or the output of `draw`/`reroll`.
    let mut snapshot_json: serde_json::Value =
        serde_json::from_str(&snapshot_raw).map_err(|e| format!("snapshot: {}", e))?;
    if !snapshot_json.is_array() {
        snapshot_json = snapshot_json
            .get_mut("eligible_snapshot")
            .map(serde_json::Value::take)
            .unwrap_or_default();
    }
    let snapshot: Vec<ParticipantId> =
        serde_json::from_value(snapshot_json).map_err(|e| format!("snapshot: {}", e))?;
    let winners = required(flags, "winners")?
        .split(',')
        .map(|s| s.trim().parse::<ParticipantId>().map_err(|e| format!("winner id: {}", e)))
        .collect::<Result<Vec<_>, _>>()?;

    let ok = verify_lottery_result(seed, hash, &snapshot, &winners);
    println!("{}", if ok { "VERIFIED" } else { "NOT VERIFIED" });
    if ok {
        Ok(())
    } else {
        Err("draw does not replay".into())
    }
}

/// The seed is shown or written only on explicit request.
fn keep_seed(
    flags: &HashMap<String, String>,
    seed: &str,
    out: &mut serde_json::Value,
) -> Result<(), String> {
    if let Some(path) = flags.get("seed-out") {
        fs::write(path, seed).map_err(|e| format!("write seed: {}", e))?;
    }
    if flags.contains_key("disclose-seed") {
        out["seed"] = serde_json::Value::String(seed.to_string());
    }
    if !flags.contains_key("seed-out") && !flags.contains_key("disclose-seed") {
        eprintln!("warning: seed discarded; this draw can no longer be replayed by third parties");
    }
    Ok(())
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn required<'a>(flags: &'a HashMap<String, String>, name: &str) -> Result<&'a str, String> {
    flags
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("missing --{}", name))
}

fn parse_flag<T>(flags: &HashMap<String, String>, name: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    required(flags, name)?
        .parse::<T>()
        .map_err(|e| format!("bad --{}: {}", name, e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let s = serde_json::to_string_pretty(value).map_err(|e| format!("{}", e))?;
    println!("{}", s);
    Ok(())
}
