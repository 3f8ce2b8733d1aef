use crate::{
    accounts::{AccountError, AccountStore, Registration},
    config::Config,
    contact::{self, UrlLauncher},
    journal::Journal,
    session::{Screen, Session},
    stopwatch::format_elapsed,
};
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

pub struct Context {
    pub root: PathBuf,
    pub session_id: String,
    pub config: Config,
    pub store: RefCell<AccountStore>,
    pub session: RefCell<Session>,
    pub journal: RefCell<Option<Journal>>,
    pub launcher: Box<dyn UrlLauncher>,
}

impl Context {
    /// Write a journal event. The first failure disables the journal.
    fn record(&self, f: impl FnOnce(&mut Journal) -> Result<()>) {
        let mut journal = self.journal.borrow_mut();
        if let Some(j) = journal.as_mut() {
            if let Err(e) = f(j) {
                eprintln!("Warning: journal disabled after write failure: {}", e);
                *journal = None;
            }
        }
    }
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("{}", ctx.config.app.title);
    println!("Type /help for commands, /exit to quit");
    render_screen(&ctx);

    loop {
        let prompt = format!("{}> ", ctx.session.borrow().screen().as_str());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if line.starts_with('/') {
                    // Keep credentials out of the in-memory history
                    if !line.starts_with("/login") {
                        rl.add_history_entry(line)?;
                    }
                    if handle_command(&ctx, &mut rl, line) {
                        break;
                    }
                    continue;
                }

                println!("Unknown input. Type /help for commands.");
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(ctx: &Context, rl: &mut DefaultEditor, cmd: &str) -> bool {
    let parts: Vec<&str> = cmd.splitn(2, ' ').collect();
    let rest = if parts.len() > 1 { parts[1].trim() } else { "" };
    match parts[0] {
        "/exit" | "/quit" => return true,
        "/help" => print_help(),
        "/login" => handle_login(ctx, rest),
        "/register" => handle_register(ctx, rl),
        "/logout" => handle_logout(ctx),
        "/home" => handle_navigate(ctx, Screen::Home),
        "/stopwatch" => handle_navigate(ctx, Screen::Stopwatch),
        "/start" => handle_start(ctx),
        "/stop" => handle_stop(ctx),
        "/rep+" => handle_repetition(ctx, true),
        "/rep-" => handle_repetition(ctx, false),
        "/time" => handle_time(ctx),
        "/watch" => handle_watch(ctx, rest),
        "/contact" => handle_contact(ctx),
        "/whoami" => {
            let session = ctx.session.borrow();
            match session.user() {
                Some(user) => println!("{} <{}>", session.greeting(), user.email),
                None => println!("{}", session.greeting()),
            }
        }
        "/session" => {
            println!("Session: {}", ctx.session_id);
            println!("Working dir: {}", ctx.root.display());
            println!("Store: {}", ctx.store.borrow().path().display());
            if let Some(journal) = ctx.journal.borrow().as_ref() {
                println!("Journal: {}", journal.path.display());
            }
        }
        _ => println!("Unknown command: {}", parts[0]),
    }
    false
}

fn print_help() {
    println!("Account:");
    println!("  /login <email> <password> - log in");
    println!("  /register                 - create an account");
    println!("  /logout                   - log out");
    println!("  /whoami                   - show the current user");
    println!("Screens:");
    println!("  /home                     - promotions and news");
    println!("  /stopwatch                - open a fresh stopwatch");
    println!("Stopwatch:");
    println!("  /start                    - start, or restart from zero");
    println!("  /stop                     - stop and count one repetition");
    println!("  /rep+  /rep-              - adjust the repetition count");
    println!("  /time                     - show elapsed time");
    println!("  /watch [seconds]          - follow the running clock (default 5)");
    println!("Other:");
    println!("  /contact                  - message the gym");
    println!("  /session                  - show session info");
    println!("  /help  /exit");
}

fn render_screen(ctx: &Context) {
    let session = ctx.session.borrow();
    match session.screen() {
        Screen::Login => {
            println!("\n== Log in to your account ==");
            println!("  /login <email> <password>, or /register to create an account");
        }
        Screen::Register => {
            println!("\n== Create your account ==");
        }
        Screen::Home => {
            println!("\n== {} ==", ctx.config.app.title);
            println!("Welcome back!");
            println!("{}", session.greeting());
            println!("\nDon't miss out!");
            println!("  * New classes open! Check out our new group classes.");
            println!("  * Personal Trainer. Book your free assessment.");
            println!("  (/contact to message us about either)");
        }
        Screen::Stopwatch => {
            println!("\n== Stopwatch ==");
            if let Ok(sw) = session.stopwatch() {
                println!("Elapsed: {}", sw.display());
                println!("Repetitions: {}", sw.repetitions());
            }
        }
    }
}

fn print_account_error(e: &AccountError) {
    match e {
        AccountError::Validation(errors) => {
            for err in errors {
                println!("  {}: {}", err.field.as_str(), err.message);
            }
        }
        AccountError::AuthenticationFailure => println!("Incorrect email or password."),
        AccountError::Storage(err) => eprintln!("Error: {}", err),
    }
}

fn handle_login(ctx: &Context, args: &str) {
    let mut parts = args.splitn(2, char::is_whitespace);
    let email = parts.next().unwrap_or("").trim();
    let password = parts.next().unwrap_or("").trim();

    let (previous, result) = {
        let store = ctx.store.borrow();
        let mut session = ctx.session.borrow_mut();
        let previous = session.user().map(|user| user.email.clone());
        let result = session
            .login(&store, email, password)
            .map(|user| user.name.clone());
        (previous, result)
    };

    match result {
        Ok(name) => {
            if let Some(previous) = previous {
                ctx.record(|j| j.logout(&previous));
            }
            println!("Welcome, {}!", name);
            ctx.record(|j| j.login_ok(email));
            render_screen(ctx);
        }
        Err(e) => {
            let reason = match e {
                AccountError::Validation(_) => "validation",
                _ => "authentication",
            };
            print_account_error(&e);
            ctx.record(|j| j.login_failed(email, reason));
        }
    }
}

fn prompt_field(rl: &mut DefaultEditor, label: &str) -> Option<String> {
    rl.readline(&format!("  {}: ", label)).ok()
}

fn prompt_registration(rl: &mut DefaultEditor) -> Option<Registration> {
    Some(Registration {
        name: prompt_field(rl, "Full name")?,
        email: prompt_field(rl, "Email")?,
        password: prompt_field(rl, "Password")?,
        confirm_password: prompt_field(rl, "Confirm password")?,
    })
}

fn handle_register(ctx: &Context, rl: &mut DefaultEditor) {
    if let Err(e) = ctx.session.borrow_mut().navigate(Screen::Register) {
        println!("{}", e);
        return;
    }
    render_screen(ctx);

    let Some(form) = prompt_registration(rl) else {
        println!("Registration cancelled.");
        return;
    };

    let email = form.email.trim().to_string();
    let result = {
        let mut store = ctx.store.borrow_mut();
        ctx.session.borrow_mut().register(&mut store, &form)
    };

    match result {
        Ok(_) => {
            println!("Registration complete! Please log in.");
            ctx.record(|j| j.register_ok(&email));
            render_screen(ctx);
        }
        Err(e) => {
            print_account_error(&e);
            let fields: Vec<&str> = e.field_errors().iter().map(|f| f.field.as_str()).collect();
            ctx.record(|j| j.register_rejected(&email, &fields));
        }
    }
}

fn handle_logout(ctx: &Context) {
    let user = ctx.session.borrow_mut().logout();
    match user {
        Some(user) => {
            println!("Logged out.");
            ctx.record(|j| j.logout(&user.email));
        }
        None => println!("Not logged in."),
    }
    render_screen(ctx);
}

fn handle_navigate(ctx: &Context, to: Screen) {
    let result = ctx.session.borrow_mut().navigate(to);
    match result {
        Ok(from) => {
            ctx.record(|j| j.navigate(from.as_str(), to.as_str()));
            render_screen(ctx);
        }
        Err(e) => println!("{}", e),
    }
}

fn handle_start(ctx: &Context) {
    let mut session = ctx.session.borrow_mut();
    match session.stopwatch_mut() {
        Ok(sw) => {
            let restarted = sw.is_running();
            sw.start();
            println!(
                "{} (refresh every {} ms)",
                if restarted { "Restarted" } else { "Started" },
                sw.interval().as_millis()
            );
            ctx.record(|j| j.stopwatch_start(restarted));
        }
        Err(e) => println!("{}", e),
    }
}

fn handle_stop(ctx: &Context) {
    let mut session = ctx.session.borrow_mut();
    match session.stopwatch_mut() {
        Ok(sw) => {
            if !sw.stop() {
                println!("Stopwatch is not running.");
                return;
            }
            let tick = sw.snapshot();
            println!("Stopped at {}", tick.display());
            println!("Repetitions: {}", tick.repetitions);
            let elapsed_ms = u64::try_from(tick.elapsed.as_millis()).unwrap_or(u64::MAX);
            ctx.record(|j| j.stopwatch_stop(elapsed_ms, tick.repetitions));
        }
        Err(e) => println!("{}", e),
    }
}

fn handle_repetition(ctx: &Context, up: bool) {
    let session = ctx.session.borrow();
    match session.stopwatch() {
        Ok(sw) => {
            let count = if up {
                sw.increment_repetition()
            } else {
                sw.decrement_repetition()
            };
            println!("Repetitions: {}", count);
        }
        Err(e) => println!("{}", e),
    }
}

fn handle_time(ctx: &Context) {
    let session = ctx.session.borrow();
    match session.stopwatch() {
        Ok(sw) => println!(
            "Elapsed: {} [{}]  Repetitions: {}",
            sw.display(),
            sw.state().as_str(),
            sw.repetitions()
        ),
        Err(e) => println!("{}", e),
    }
}

fn handle_watch(ctx: &Context, args: &str) {
    let seconds = if args.is_empty() {
        5
    } else {
        match args.parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                println!("Usage: /watch [seconds]");
                return;
            }
        }
    };

    let session = ctx.session.borrow();
    let sw = match session.stopwatch() {
        Ok(sw) => sw,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };
    if !sw.is_running() {
        println!("Elapsed: {}  Repetitions: {}", sw.display(), sw.repetitions());
        return;
    }

    let rx = sw.subscribe();
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut stdout = std::io::stdout();
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(tick) => {
                let _ = write!(
                    stdout,
                    "\rElapsed: {}  Repetitions: {}",
                    format_elapsed(tick.elapsed),
                    tick.repetitions
                );
                let _ = stdout.flush();
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    println!();
}

fn handle_contact(ctx: &Context) {
    let number = &ctx.config.contact.number;
    match contact::open_contact(ctx.launcher.as_ref(), number) {
        Ok(link) => {
            println!("Opening {}", link);
            ctx.record(|j| j.contact_opened(&link, true));
        }
        Err(e) => {
            let link = contact::contact_link(number);
            eprintln!("Warning: {}", e);
            println!("Message us at {}", link);
            ctx.record(|j| j.contact_opened(&link, false));
        }
    }
}
