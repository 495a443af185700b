//! Command-line interface for cube-alarm.
//!
//! This binary talks to a running daemon over its HTTP API.

use std::env;

use anyhow::Result;

use cube_alarm::api_client::{self, types::CubeStatus};

const ENV_API_URL: &str = "CUBE_ALARM_API_URL";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let command = &args[1];
    let client = make_client();

    match command.as_str() {
        "status" => cmd_status(&client).await?,
        "alarms" => cmd_alarms(&client).await?,
        "stop" => {
            let response = client.stop().await?;
            if response.stopped {
                println!("Alarm stopped");
            } else {
                println!("No alarm ringing");
            }
        }
        "connect" => print_cube(&client.cube_connect().await?),
        "disconnect" => print_cube(&client.cube_disconnect().await?),
        "reset" => print_cube(&client.cube_reset().await?),
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn usage() {
    eprintln!("Usage: cube-alarm-cli <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status      Show cube and alarm state");
    eprintln!("  alarms      List alarms");
    eprintln!("  stop        Stop the ringing alarm");
    eprintln!("  connect     Connect to the cube");
    eprintln!("  disconnect  Disconnect from the cube");
    eprintln!("  reset       Mark the cube solved");
    eprintln!();
    eprintln!("Environment:");
    eprintln!(
        "  {ENV_API_URL}    API base URL (default: {})",
        api_client::DEFAULT_BASE_URL
    );
}

/// Build an API client, honoring CUBE_ALARM_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var(ENV_API_URL) {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

async fn cmd_status(client: &api_client::Client) -> Result<()> {
    let status = client.status().await?;

    println!("Uptime:  {} s", status.uptime_secs);
    println!("Alarms:  {}", status.alarm_count);
    print_cube(&status.snapshot.cube);

    match &status.snapshot.active_alarm {
        Some(active) => println!(
            "Ringing: {} ({}) since {}",
            active.alarm.id, active.alarm.time, active.triggered_at
        ),
        None => println!("Ringing: no"),
    }

    Ok(())
}

async fn cmd_alarms(client: &api_client::Client) -> Result<()> {
    let alarms = client.alarms().await?;
    if alarms.is_empty() {
        println!("(no alarms)");
        return Ok(());
    }

    for alarm in &alarms {
        let days = if alarm.days.is_empty() {
            "never".to_string()
        } else {
            alarm
                .days
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        println!(
            "{} {} [{}] {}{}  {}",
            if alarm.enabled { "*" } else { " " },
            alarm.time,
            days,
            alarm.id,
            if alarm.requires_cube_solve { "" } else { " (no solve)" },
            alarm.label,
        );
    }

    Ok(())
}

fn print_cube(cube: &CubeStatus) {
    let battery = cube
        .battery
        .map(|b| format!("{b}%"))
        .unwrap_or_else(|| "?".to_string());
    println!(
        "Cube:    {:?}, {}, battery {}",
        cube.phase,
        if cube.solved { "solved" } else { "scrambled" },
        battery
    );
    if let Some(mv) = &cube.last_move {
        println!("Last:    {mv}");
    }
}
