use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use openmic::db::models::{Performer, Role, Song, TicketType};
use openmic::evening::{Evening, LoginRequest, NewSongRequest};
use openmic::lineup::{Lineup, LineupEntry};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "openmic", version, about = "Open-mic night lineup scheduler")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print read results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Singer,
    Audience,
    Host,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Singer => Role::Singer,
            RoleArg::Audience => Role::Audience,
            RoleArg::Host => Role::Host,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TicketArg {
    Singer,
    Audience,
}

impl From<TicketArg> for TicketType {
    fn from(t: TicketArg) -> Self {
        match t {
            TicketArg::Singer => TicketType::Singer,
            TicketArg::Audience => TicketType::Audience,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Gate {
    Open,
    Close,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a performer in (or back in after a logout)
    Login {
        first_name: String,
        last_name: String,

        #[arg(long, value_enum, default_value = "singer")]
        role: RoleArg,

        /// Tonight's passcode
        #[arg(long)]
        passcode: String,

        /// Ticket order number (singers and audience)
        #[arg(long)]
        order: Option<i64>,

        /// Already logged in earlier tonight; reclaim that performer
        #[arg(long)]
        returning: bool,
    },

    /// Log a performer out; their songs leave the lineup until they return
    Logout { performer: i64 },

    /// Record a ticket order
    Ticket {
        order_id: i64,
        num_tickets: i64,

        #[arg(long, value_enum, default_value = "singer")]
        ticket_type: TicketArg,

        #[arg(long, default_value = "")]
        customer: String,
    },

    /// Add a song request
    AddSong {
        owner: i64,
        title: String,
        show: String,

        /// Duet/trio partner (repeatable)
        #[arg(long = "partner")]
        partners: Vec<i64>,

        #[arg(long, default_value = "")]
        notes: String,

        /// Allow a song another performer already signed up for
        #[arg(long)]
        approve: bool,
    },

    /// Remove a song request
    RemoveSong { song: i64 },

    /// Reorder a performer's unperformed songs, most wanted first
    Reorder {
        owner: i64,
        #[arg(required = true)]
        songs: Vec<i64>,
    },

    /// Replace a song's partners (none clears them)
    Partners { song: i64, partners: Vec<i64> },

    /// Mark a song performed
    Performed {
        song: i64,
        /// Undo a performance instead
        #[arg(long)]
        undo: bool,
    },

    /// Skip a song (it keeps its priority)
    Skip {
        song: i64,
        #[arg(long)]
        undo: bool,
    },

    /// Hold a song out of the lineup
    Standby {
        song: i64,
        #[arg(long)]
        undo: bool,
    },

    /// Put a song in the spotlight, or turn the spotlight off
    Spotlight {
        song: Option<i64>,
        /// Turn the spotlight off (a non-standby song counts as performed)
        #[arg(long, conflicts_with = "song")]
        off: bool,
    },

    /// Open or close signup
    Signup {
        #[arg(value_enum)]
        gate: Gate,
    },

    /// Group song suggestions and the current group number
    #[command(subcommand)]
    GroupSong(GroupAction),

    /// Raffle for audience members
    #[command(subcommand)]
    Raffle(RaffleAction),

    /// Show or change tonight's passcode
    Passcode { code: Option<String> },

    /// Delete every performer, song and ticket order (keeps the passcode)
    Reset {
        #[arg(long)]
        yes: bool,
    },

    /// Rebuild every position from the stored entities
    Recalculate,

    /// Current song and the queue behind it
    Lineup,

    /// What a performer sees: current, next and their own next song
    Dashboard { performer: i64 },

    /// Performer ordering behind the lineup
    Ordering,

    /// List performers
    Performers,

    /// List songs
    Songs {
        /// Only songs this performer owns or partners on
        #[arg(long)]
        performer: Option<i64>,
    },

    /// Evening statistics
    Stats,
}

#[derive(Subcommand)]
enum GroupAction {
    Suggest {
        title: String,
        show: String,
        #[arg(long, default_value = "")]
        by: String,
    },
    Start {
        id: i64,
    },
    End,
    Current,
}

#[derive(Subcommand)]
enum RaffleAction {
    /// Opt an audience member in
    Join { performer: i64 },
    /// Opt an audience member out
    Leave { performer: i64 },
    /// Draw a random winner among those who opted in
    Draw,
    /// Make a chosen audience member a winner
    Promote { performer: i64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = openmic::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(openmic::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = openmic::db::Database::open(&db_path).context("Failed to open database")?;
    let evening = Evening::open(db, config.evening).context("Failed to open evening")?;
    let json = cli.json;

    match cli.command {
        Commands::Login { first_name, last_name, role, passcode, order, returning } => {
            let performer = evening
                .login_performer(&LoginRequest {
                    first_name,
                    last_name,
                    role: role.into(),
                    passcode,
                    ticket_order: order,
                    returning,
                })
                .context("Login failed")?;
            emit(json, &performer, |p| {
                println!("Logged in {} (id {}, {})", p.display_name(), p.id, p.role.as_str());
            })?;
        }

        Commands::Logout { performer } => {
            evening.logout_performer(performer).context("Logout failed")?;
            println!("Logged out performer {}", performer);
        }

        Commands::Ticket { order_id, num_tickets, ticket_type, customer } => {
            evening
                .register_ticket_order(order_id, num_tickets, ticket_type.into(), &customer)
                .context("Failed to record ticket order")?;
            println!("Ticket order {} recorded ({} tickets)", order_id, num_tickets);
        }

        Commands::AddSong { owner, title, show, partners, notes, approve } => {
            let song = evening
                .add_song(&NewSongRequest {
                    owner_id: owner,
                    title,
                    show,
                    partners,
                    notes,
                    approve_duplicate: approve,
                })
                .context("Failed to add song")?;
            emit(json, &song, |s| {
                let position = s.position.map_or("-".to_string(), |p| p.to_string());
                println!(
                    "Added \"{}\" ({}) as song {}, position {}",
                    s.title, s.show, s.id, position
                );
            })?;
        }

        Commands::RemoveSong { song } => {
            evening.remove_song(song).context("Failed to remove song")?;
            println!("Removed song {}", song);
        }

        Commands::Reorder { owner, songs } => {
            evening
                .reorder_priorities(owner, &songs)
                .context("Failed to reorder songs")?;
            println!("New priorities for performer {}: {:?}", owner, songs);
        }

        Commands::Partners { song, partners } => {
            evening
                .set_partners(song, &partners)
                .context("Failed to set partners")?;
            println!("Song {} partners: {:?}", song, partners);
        }

        Commands::Performed { song, undo } => {
            if undo {
                evening.unmark_performed(song).context("Failed to undo performance")?;
                println!("Song {} is back in the lineup", song);
            } else {
                evening.mark_performed(song).context("Failed to mark performed")?;
                println!("Song {} performed", song);
            }
        }

        Commands::Skip { song, undo } => {
            if undo {
                evening.unset_skipped(song)?;
            } else {
                evening.set_skipped(song)?;
            }
        }

        Commands::Standby { song, undo } => {
            if undo {
                evening.unset_standby(song)?;
            } else {
                evening.set_standby(song)?;
            }
        }

        Commands::Spotlight { song, off } => match (song, off) {
            (_, true) => match evening.remove_spotlight()? {
                Some(id) => println!("Spotlight off song {}", id),
                None => println!("No song was in the spotlight."),
            },
            (Some(id), false) => {
                evening.set_spotlight(id).context("Failed to set spotlight")?;
                println!("Spotlight on song {}", id);
            }
            (None, false) => bail!("Give a song id, or --off"),
        },

        Commands::Signup { gate } => match gate {
            Gate::Open => {
                evening.open_signup()?;
                println!("Signup open");
            }
            Gate::Close => {
                evening.close_signup()?;
                println!("Signup closed: newcomers go first");
            }
        },

        Commands::GroupSong(action) => match action {
            GroupAction::Suggest { title, show, by } => {
                let song = evening.suggest_group_song(&title, &show, &by)?;
                emit(json, &song, |g| {
                    println!("Suggested group song {}: \"{}\" ({})", g.id, g.title, g.show);
                })?;
            }
            GroupAction::Start { id } => {
                let song = evening.start_group_song(id)?;
                println!("Now singing together: \"{}\" ({})", song.title, song.show);
            }
            GroupAction::End => {
                evening.end_group_song()?;
                println!("Group song ended");
            }
            GroupAction::Current => {
                let current = evening.current_group_song()?;
                emit(json, &current, |c| match c {
                    Some(g) => println!("\"{}\" ({}), suggested by {}", g.title, g.show, g.suggested_by),
                    None => println!("No group song right now."),
                })?;
            }
        },

        Commands::Raffle(action) => match action {
            RaffleAction::Join { performer } => {
                evening.set_raffle_participation(performer, true)?;
                println!("Performer {} is in the raffle", performer);
            }
            RaffleAction::Leave { performer } => {
                evening.set_raffle_participation(performer, false)?;
                println!("Performer {} left the raffle", performer);
            }
            RaffleAction::Draw => match evening.draw_raffle_winner()? {
                Some(p) => println!("And the winner is... {} (id {})", p.display_name(), p.id),
                None => println!("Nobody left in the raffle."),
            },
            RaffleAction::Promote { performer } => {
                let p = evening.promote_raffle_winner(performer)?;
                println!("{} may now sign up for a song", p.display_name());
            }
        },

        Commands::Passcode { code } => match code {
            Some(code) => {
                evening.set_passcode(&code)?;
                println!("Passcode updated");
            }
            None => println!("{}", evening.passcode()?),
        },

        Commands::Reset { yes } => {
            if !yes {
                bail!("Reset deletes the whole evening; re-run with --yes");
            }
            evening.reset_evening()?;
            println!("Evening reset");
        }

        Commands::Recalculate => {
            evening.recalculate()?;
            println!("Positions rebuilt");
        }

        Commands::Lineup => {
            let lineup = evening.lineup()?;
            emit(json, &lineup, print_lineup)?;
        }

        Commands::Dashboard { performer } => {
            let dash = evening.dashboard(performer)?;
            emit(json, &dash, |d| {
                print_entry("Now", d.current.as_ref());
                print_entry("Next", d.next.as_ref());
                match &d.user_next {
                    Some(u) => println!(
                        "Your next song: \"{}\" ({}), {} song(s) before it",
                        u.entry.title, u.entry.show, u.wait_amount
                    ),
                    None => println!("You have no song in the lineup."),
                }
                if d.raffle_winner_already_sang {
                    println!("You already sang your raffle song.");
                }
            })?;
        }

        Commands::Ordering => {
            let order = evening.ordering()?;
            let performers = evening.performers()?;
            emit(json, &order, |ids| {
                for (i, id) in ids.iter().enumerate() {
                    let name = performers
                        .iter()
                        .find(|p| p.id == *id)
                        .map(Performer::display_name)
                        .unwrap_or_default();
                    println!("{:>3}. {:<30} (id {})", i + 1, name, id);
                }
            })?;
        }

        Commands::Performers => {
            let performers = evening.performers()?;
            emit(json, &performers, |ps| print_performer_table(ps))?;
        }

        Commands::Songs { performer } => {
            let songs = match performer {
                Some(id) => evening.songs_of(id)?,
                None => evening.songs()?,
            };
            emit(json, &songs, |ss| print_song_table(ss))?;
        }

        Commands::Stats => {
            let stats = evening.stats()?;
            let state = evening.event_state()?;
            emit(json, &stats, |s| {
                println!("Evening Statistics");
                println!("==================");
                println!("Signup:           {}", if state.signup_open { "open" } else { "closed" });
                println!("Performers:       {}", s.performers);
                println!("Active singers:   {}", s.active_singers);
                println!("Songs requested:  {}", s.songs_requested);
                println!("Songs performed:  {}", s.songs_performed);
                println!("Songs in lineup:  {}", s.songs_in_lineup);
            })?;
        }
    }

    Ok(())
}

/// Print `value` as JSON, or hand it to the human-readable printer.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let cut: String = s.chars().take(width - 3).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

fn print_entry(label: &str, entry: Option<&LineupEntry>) {
    match entry {
        Some(e) => println!("{:<5} \"{}\" ({}) - {}", label, e.title, e.show, e.singers),
        None => println!("{:<5} -", label),
    }
}

fn print_lineup(lineup: &Lineup) {
    if lineup.current.is_none() && lineup.next.is_empty() {
        println!("The lineup is empty.");
        return;
    }

    println!("{:>4} {:>6}  {:<28} {:<24} {}", "Pos", "Song", "Title", "Show", "Singers");
    println!("{}", "-".repeat(90));
    for (i, e) in lineup.entries().enumerate() {
        let pos = match (i, e.position) {
            (0, _) if lineup.current.is_some() => "now".to_string(),
            (_, Some(p)) => p.to_string(),
            (_, None) => "-".to_string(),
        };
        println!(
            "{:>4} {:>6}  {:<28} {:<24} {}",
            pos,
            e.song_id,
            truncate(&e.title, 28),
            truncate(&e.show, 24),
            e.singers
        );
    }
}

fn print_performer_table(performers: &[Performer]) {
    if performers.is_empty() {
        println!("No performers yet.");
        return;
    }
    println!("{:>4}  {:<30} {:<9} {:<7} {}", "Id", "Name", "Role", "Active", "Joined");
    println!("{}", "-".repeat(70));
    for p in performers {
        let role = if p.raffle_winner { "winner" } else { p.role.as_str() };
        println!(
            "{:>4}  {:<30} {:<9} {:<7} {}",
            p.id,
            truncate(&p.display_name(), 30),
            role,
            if p.active { "yes" } else { "no" },
            p.join_time.format("%H:%M:%S")
        );
    }
}

fn print_song_table(songs: &[Song]) {
    if songs.is_empty() {
        println!("No songs yet.");
        return;
    }
    println!(
        "{:>4} {:>5} {:>4} {:>4}  {:<28} {:<24} {}",
        "Id", "Owner", "Prio", "Pos", "Title", "Show", "State"
    );
    println!("{}", "-".repeat(90));
    for s in songs {
        let opt = |v: Option<i64>| v.map_or("-".to_string(), |v| v.to_string());
        let state = if s.performed() {
            "performed".to_string()
        } else {
            format!("{:?}", s.state()).to_lowercase()
        };
        println!(
            "{:>4} {:>5} {:>4} {:>4}  {:<28} {:<24} {}",
            s.id,
            s.owner_id,
            opt(s.priority),
            opt(s.position),
            truncate(&s.title, 28),
            truncate(&s.show, 24),
            state
        );
    }
}
