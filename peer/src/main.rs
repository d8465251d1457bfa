use clap::Parser;
use engine::board::BOARD_SIZE;
use engine::game::{GameEngine, GameStatus};
use engine::piece::{PieceSize, Player};
use log::info;
use peer::network::{Peer, PeerCommand, PeerHandle};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host a game, listening on this port
    #[arg(long, value_name = "PORT", conflicts_with = "join")]
    host: Option<u16>,

    /// Join a game hosted at this address
    #[arg(long, value_name = "ADDR")]
    join: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let handle = Peer::spawn();

    if let Some(port) = args.host {
        let bind: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        info!("Hosting on port {}", port);
        handle.send(PeerCommand::Host { bind });
    } else if let Some(addr) = &args.join {
        let addr: SocketAddr = addr.parse()?;
        info!("Joining {}", addr);
        handle.send(PeerCommand::Join { addr });
    } else {
        println!("No --host or --join given, starting a local two-player game.");
    }

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !run_command(line.trim(), &handle).await {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    handle.send(PeerCommand::Shutdown);
    Ok(())
}

/// Executes one console command. Returns false when it is time to quit.
async fn run_command(line: &str, handle: &PeerHandle) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [] => {}
        ["help"] => print_help(),
        ["board"] => print_board(handle).await,
        ["status"] => print_status(handle).await,
        ["log"] => print_log(handle).await,
        ["log", "clear"] => {
            handle.session().write().await.log_mut().clear();
            println!("Connection log cleared.");
        }
        ["pick", size] => match parse_size(size) {
            Some(size) => {
                handle.send(PeerCommand::SelectHand { size });
            }
            None => println!("Unknown size '{}', expected s, m or l.", size),
        },
        ["lift", x, y] => match parse_cell(x, y) {
            Some((x, y)) => {
                handle.send(PeerCommand::SelectBoard { x, y });
            }
            None => println!("Expected two coordinates between 0 and 2."),
        },
        ["place", x, y] => match parse_cell(x, y) {
            Some((x, y)) => {
                handle.send(PeerCommand::Place { x, y });
            }
            None => println!("Expected two coordinates between 0 and 2."),
        },
        ["reset"] => {
            handle.send(PeerCommand::Reset);
        }
        ["disconnect"] => {
            handle.send(PeerCommand::Disconnect);
        }
        ["quit"] | ["exit"] => return false,
        _ => println!("Unknown command, try 'help'."),
    }
    true
}

fn print_help() {
    println!("Commands:");
    println!("  pick <s|m|l>     select a piece of that size from your hand");
    println!("  lift <x> <y>     pick your visible piece up off a cell");
    println!("  place <x> <y>    drop the selected piece on a cell");
    println!("  board            show the board");
    println!("  status           show game and connection status");
    println!("  log              show recent connection events");
    println!("  log clear        drop the recorded events");
    println!("  reset            restart the game");
    println!("  disconnect       leave the current session");
    println!("  quit             exit");
}

async fn print_board(handle: &PeerHandle) {
    let engine = handle.engine();
    let engine = engine.read().await;
    println!("{}", render_board(&engine));
}

async fn print_status(handle: &PeerHandle) {
    let engine = handle.engine();
    let session = handle.session();
    let engine = engine.read().await;
    let session = session.read().await;

    match session.role() {
        Some(role) => println!(
            "Session: {} as {} ({})",
            session.status(),
            role,
            role.player()
        ),
        None => println!("Session: {} (local two-player game)", session.status()),
    }
    if let Some(addr) = session.local_addr() {
        println!("Listening on {}", addr);
    }
    if let Some(addr) = session.peer_addr() {
        println!("Peer: {}", addr);
    }
    if let Some(error) = session.last_error() {
        println!("Last error: {}", error);
    }

    match engine.status() {
        GameStatus::Playing => println!("{} to move", engine.current_player()),
        GameStatus::Won(player) => println!("Game over: {} wins", player),
        GameStatus::Draw => println!("Game over: draw"),
    }
    for player in [Player::One, Player::Two] {
        let hand = engine.hand(player);
        println!(
            "{} hand: {} small, {} medium, {} large",
            player,
            hand.remaining(PieceSize::Small),
            hand.remaining(PieceSize::Medium),
            hand.remaining(PieceSize::Large)
        );
    }
}

async fn print_log(handle: &PeerHandle) {
    let session = handle.session();
    let session = session.read().await;
    if session.log().is_empty() {
        println!("No connection events yet.");
        return;
    }
    for entry in session.log().entries() {
        println!("[{:?}] {}", entry.level, entry.text);
    }
}

/// Renders the board with one cell per visible piece: size letter plus
/// owner digit, or a dot for an empty cell.
fn render_board(engine: &GameEngine) -> String {
    let mut out = String::from("     x0  x1  x2\n");
    for y in 0..BOARD_SIZE {
        out.push_str(&format!("  y{} ", y));
        for x in 0..BOARD_SIZE {
            match engine.top_piece(x, y) {
                Some(piece) => {
                    out.push_str(&format!(" {}{} ", size_letter(piece.size), owner_digit(piece.owner)))
                }
                None => out.push_str("  . "),
            }
        }
        out.push('\n');
    }
    out
}

fn size_letter(size: PieceSize) -> char {
    match size {
        PieceSize::Small => 'S',
        PieceSize::Medium => 'M',
        PieceSize::Large => 'L',
    }
}

fn owner_digit(player: Player) -> char {
    match player {
        Player::One => '1',
        Player::Two => '2',
    }
}

fn parse_size(text: &str) -> Option<PieceSize> {
    match text {
        "s" | "small" => Some(PieceSize::Small),
        "m" | "medium" => Some(PieceSize::Medium),
        "l" | "large" => Some(PieceSize::Large),
        _ => None,
    }
}

fn parse_cell(x: &str, y: &str) -> Option<(u8, u8)> {
    let x: u8 = x.parse().ok()?;
    let y: u8 = y.parse().ok()?;
    if x < BOARD_SIZE && y < BOARD_SIZE {
        Some((x, y))
    } else {
        None
    }
}
