//! CLI interface for registrate

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{self, BrowserKind, Channel, Config};
use crate::messaging::{ChatRegistration, TelegramClient, TelegramConfig};
use crate::security::{prompt_secret, CredentialStore, Credentials, EncodedSecret};
use crate::storage::{CourseStore, CsvCourseStore};
use crate::types::{Course, CourseSet};

#[derive(Parser)]
#[command(name = "registrate")]
#[command(about = "Check the course-registration portal for open exam sign-ups", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true, env = "REGISTRATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, probe every incomplete course and notify (default when no command given)
    Run(RunArgs),
    /// Manage tracked courses
    Courses {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Manage login and notification credentials
    Credentials {
        #[command(subcommand)]
        command: CredentialCommands,
    },
    /// Telegram bot setup
    Telegram {
        #[command(subcommand)]
        command: TelegramCommands,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Per-run overrides of the configuration file
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Browser backend for this run
    #[arg(short, long, value_enum)]
    browser: Option<BrowserKind>,
    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
    /// Show the browser window even if the config says headless
    #[arg(long, conflicts_with = "headless")]
    no_headless: bool,
    /// Notification channels for this run (comma separated)
    #[arg(short, long, value_enum, value_delimiter = ',')]
    notify: Option<Vec<Channel>>,
    /// Add courses interactively before checking
    #[arg(long)]
    add_courses: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(kind) = self.browser {
            config.browser.kind = kind;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if self.no_headless {
            config.browser.headless = false;
        }
        if let Some(channels) = &self.notify {
            config.notify.channels = channels.clone();
        }
    }
}

#[derive(Subcommand)]
enum CourseCommands {
    /// List tracked courses
    List,
    /// Track a course (interactive when no code is given)
    Add {
        /// Course code as searched on the portal
        code: Option<String>,
        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,
        /// Mark as already completed
        #[arg(long)]
        completed: bool,
    },
    /// Mark a course completed so it is no longer checked
    Complete { code: String },
    /// Stop tracking a course
    Remove { code: String },
}

#[derive(Subcommand)]
enum CredentialCommands {
    /// Enter credentials interactively (blank keeps the current value)
    Set,
    /// Show which credentials are stored
    Show,
}

#[derive(Subcommand)]
enum TelegramCommands {
    /// Record your chat id by sending /start to the bot
    Register {
        /// Give up after this many seconds
        #[arg(long, default_value = "300")]
        timeout_secs: u64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };

    // Default to a check run if no command given
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let mut config = Config::load_from(&config_path)?;
            args.apply(&mut config);

            if args.add_courses {
                let store = course_store(&config)?;
                let mut courses = store.load()?;
                add_interactively(&mut courses)?;
                store.save(&courses)?;
            }

            let summary = crate::run::run(&config).await?;
            println!("{}", summary.probes.summary());
            if summary.probes.available().is_empty() {
                println!("No open sign ups found.");
            } else {
                println!("Open for sign up:");
                for course in summary.probes.available().as_slice() {
                    println!("  {}", course);
                }
            }
        }
        Commands::Courses { command } => {
            let config = Config::load_from(&config_path)?;
            let store = course_store(&config)?;
            let mut courses = store.load()?;

            match command {
                CourseCommands::List => {
                    if courses.is_empty() {
                        println!("No courses tracked. Add one with 'registrate courses add'.");
                    }
                    for course in courses.iter() {
                        let done = if course.is_completed() { " [done]" } else { "" };
                        println!("{}{}", course, done);
                    }
                }
                CourseCommands::Add { code, name, completed } => {
                    match code {
                        Some(code) => {
                            let course = Course::new(code, name, completed)?;
                            println!("Tracking {}", course);
                            courses.add(course)?;
                        }
                        None => add_interactively(&mut courses)?,
                    }
                    store.save(&courses)?;
                }
                CourseCommands::Complete { code } => {
                    courses.complete(&code)?;
                    store.save(&courses)?;
                    println!("Marked {} as completed", code);
                }
                CourseCommands::Remove { code } => {
                    let removed = courses.remove(&code)?;
                    store.save(&courses)?;
                    println!("Removed {}", removed);
                }
            }
        }
        Commands::Credentials { command } => {
            let config = Config::load_from(&config_path)?;
            let store = CredentialStore::new(config.storage.credentials_path()?);

            match command {
                CredentialCommands::Set => {
                    let current = store.load()?;
                    let updated = prompt_credentials(current)?;
                    store.save(&updated)?;
                    println!("Credentials saved to {}", store.path().display());
                }
                CredentialCommands::Show => {
                    show_credentials(&store.load()?, store.path());
                }
            }
        }
        Commands::Telegram { command } => match command {
            TelegramCommands::Register { timeout_secs } => {
                let config = Config::load_from(&config_path)?;
                let store = CredentialStore::new(config.storage.credentials_path()?);
                let token = store
                    .load()?
                    .telegram_token
                    .filter(|t| !t.trim().is_empty())
                    .context("No Telegram token stored. Run 'registrate credentials set' first.")?;

                let client = TelegramClient::new(TelegramConfig::new(token, &config.telegram))?;
                println!("Send /start to your bot to register this chat...");
                let chat_id = ChatRegistration::new(client, store, Duration::from_secs(timeout_secs))
                    .run()
                    .await?;
                println!("Registered chat {}", chat_id);
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load_from(&config_path)?;
                config::show_config(&config)?;
            }
            ConfigCommands::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists. Use --force to overwrite it.",
                        config_path.display()
                    );
                }
                Config::default().save_to(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
        },
    }

    Ok(())
}

fn course_store(config: &Config) -> Result<CsvCourseStore> {
    Ok(CsvCourseStore::new(config.storage.courses_path()?)?)
}

fn add_interactively(courses: &mut CourseSet) -> Result<()> {
    let stdin = std::io::stdin();
    let added = prompt_courses(&mut stdin.lock(), &mut std::io::stdout(), courses)?;
    for course in added {
        courses.add(course)?;
    }
    Ok(())
}

/// Interactive add loop: ask for courses until the user says they are done.
///
/// Returns the confirmed courses; `existing` is only used to reject codes
/// that are already tracked. Stops quietly at end of input.
fn prompt_courses<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    existing: &CourseSet,
) -> Result<Vec<Course>> {
    let mut added: Vec<Course> = Vec::new();

    loop {
        let Some(code) = ask(input, output, "\nPlease input course code: ")? else {
            break;
        };
        if code.is_empty() {
            writeln!(output, "The course code is not optional!")?;
            continue;
        }
        let already_tracked = existing.get(&code).is_some()
            || added.iter().any(|c| c.code().eq_ignore_ascii_case(&code));
        if already_tracked {
            writeln!(output, "Course '{}' is already tracked.", code)?;
            continue;
        }

        let Some(name) = ask(input, output, "(Optional) Please input course name: ")? else {
            break;
        };
        let Some(completed) = ask(input, output, "Is this course completed? (y/n, default=n): ")?
        else {
            break;
        };

        let course = match Course::new(code, name, is_yes(&completed)) {
            Ok(course) => course,
            Err(e) => {
                writeln!(output, "{}", e)?;
                continue;
            }
        };
        writeln!(output, "{}", course)?;

        let Some(correct) = ask(input, output, "Is this course correct? (y/n): ")? else {
            break;
        };
        if !is_yes(&correct) {
            continue;
        }
        added.push(course);

        let Some(done) = ask(input, output, "Are these all the courses you want to add? (y/n): ")?
        else {
            break;
        };
        if is_yes(&done) {
            break;
        }
    }

    Ok(added)
}

/// Print a prompt and read one trimmed line; None at end of input
fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

fn prompt_credentials(mut creds: Credentials) -> Result<Credentials> {
    // Each prompt takes its own stdin lock; prompt_secret reads stdin too
    let mut output = std::io::stdout();

    println!("Leave a field blank to keep its current value.");

    if let Some(net_id) = ask_keep(&mut std::io::stdin().lock(), &mut output, "NetID", Some(creds.net_id.as_str()))? {
        creds.net_id = net_id;
    }
    let password = prompt_secret("NetID password: ")?;
    if !password.is_empty() {
        creds.net_password = EncodedSecret::encode(&password);
    }

    if let Some(sender) = ask_keep(&mut std::io::stdin().lock(), &mut output, "Sender mail", creds.sender_mail.as_deref())? {
        creds.sender_mail = Some(sender);
    }
    if let Some(receiver) = ask_keep(&mut std::io::stdin().lock(), &mut output, "Receiver mail", creds.receiver_mail.as_deref())? {
        creds.receiver_mail = Some(receiver);
    }
    let mail_password = prompt_secret("Mail (app) password: ")?;
    if !mail_password.is_empty() {
        creds.mail_password = Some(EncodedSecret::encode(&mail_password));
    }

    let token = prompt_secret("Telegram bot token: ")?;
    if !token.is_empty() {
        creds.telegram_token = Some(token);
    }

    Ok(creds)
}

/// Ask for a value showing the current one; None keeps it
fn ask_keep<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    current: Option<&str>,
) -> Result<Option<String>> {
    let prompt = match current.filter(|c| !c.is_empty()) {
        Some(current) => format!("{} [{}]: ", label, current),
        None => format!("{}: ", label),
    };
    Ok(ask(input, output, &prompt)?.filter(|answer| !answer.is_empty()))
}

fn show_credentials(creds: &Credentials, path: &Path) {
    let mark = |set: bool| if set { "set" } else { "not set" };
    let has = |value: &Option<String>| value.as_deref().map_or(false, |v| !v.trim().is_empty());

    println!("Credentials file: {}", path.display());
    println!("  net_id:           {}", mark(!creds.net_id.trim().is_empty()));
    println!("  net_password:     {}", mark(!creds.net_password.is_empty()));
    println!("  sender_mail:      {}", mark(has(&creds.sender_mail)));
    println!("  receiver_mail:    {}", mark(has(&creds.receiver_mail)));
    println!(
        "  mail_password:    {}",
        mark(creds.mail_password.as_ref().map_or(false, |p| !p.is_empty()))
    );
    println!("  telegram_token:   {}", mark(has(&creds.telegram_token)));
    println!("  telegram_chat_id: {}", mark(has(&creds.telegram_chat_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_prompt(script: &str, existing: &CourseSet) -> (Vec<Course>, String) {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut output = Vec::new();
        let added = prompt_courses(&mut input, &mut output, existing).unwrap();
        (added, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_prompt_adds_confirmed_courses() {
        let script = "CSE1100\nOOP\n\ny\nn\nWI1000\n\ny\ny\ny\n";
        let (added, _) = run_prompt(script, &CourseSet::default());

        assert_eq!(added.len(), 2);
        assert_eq!(added[0].code(), "CSE1100");
        assert_eq!(added[0].name(), "OOP");
        assert!(!added[0].is_completed());
        assert_eq!(added[1].code(), "WI1000");
        assert!(added[1].is_completed());
    }

    #[test]
    fn test_prompt_reasks_empty_code_and_skips_rejected() {
        // empty code, then a course the user rejects, then one they keep
        let script = "\nCS101\n\nn\nn\nCS202\nAlgorithms\nn\ny\ny\n";
        let (added, output) = run_prompt(script, &CourseSet::default());

        assert!(output.contains("The course code is not optional!"));
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].code(), "CS202");
    }

    #[test]
    fn test_prompt_rejects_tracked_code() {
        let existing = CourseSet::new(vec![Course::new("CS101", "", false).unwrap()]).unwrap();
        let (added, output) = run_prompt("cs101\n", &existing);

        assert!(added.is_empty());
        assert!(output.contains("already tracked"));
    }

    #[test]
    fn test_run_args_override_config() {
        let mut config = Config::default();
        let args = RunArgs {
            browser: Some(BrowserKind::Firefox),
            headless: true,
            no_headless: false,
            notify: Some(vec![Channel::Telegram]),
            add_courses: false,
        };
        args.apply(&mut config);

        assert_eq!(config.browser.kind, BrowserKind::Firefox);
        assert!(config.browser.headless);
        assert_eq!(config.notify.channels, vec![Channel::Telegram]);

        let mut untouched = Config::default();
        RunArgs::default().apply(&mut untouched);
        assert_eq!(untouched.browser.kind, BrowserKind::Chrome);
        assert_eq!(untouched.notify.channels, vec![Channel::Mail]);
    }

    #[test]
    fn test_no_headless_overrides_config() {
        let mut config = Config::default();
        config.browser.headless = true;

        let cli = Cli::try_parse_from(["registrate", "run", "--no-headless"]).unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        args.apply(&mut config);
        assert!(!config.browser.headless);

        assert!(Cli::try_parse_from(["registrate", "run", "--headless", "--no-headless"]).is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["registrate", "run", "--notify", "mail,telegram", "-b", "firefox"]).unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.notify, Some(vec![Channel::Mail, Channel::Telegram]));
                assert_eq!(args.browser, Some(BrowserKind::Firefox));
            }
            _ => panic!("expected run"),
        }

        let cli = Cli::try_parse_from(["registrate", "courses", "add", "CS101", "--name", "Algorithms"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Courses { command: CourseCommands::Add { code: Some(_), .. } })
        ));

        assert!(Cli::try_parse_from(["registrate"]).unwrap().command.is_none());
    }
}
