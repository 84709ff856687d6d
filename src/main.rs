use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use studyaid::config::AuthConfig;
use studyaid::guard::{AccessGuard, Decision, Navigator, Notice, Notifier};
use studyaid::identity::{FileOverrideStore, LoginRequest, MemoryIdentityStore, Role, SessionReconciler};
use studyaid::nav::{AuthAction, NavBar};
use studyaid::routes;

const DEMO_STUDENT_EMAIL: &str = "student@example.test";
const DEMO_STUDENT_PASSWORD: &str = "student123";

/// Prints toasts and tracks the screen the user is on.
struct Console {
    location: Mutex<String>,
}

impl Navigator for Console {
    fn navigate(&self, path: &str) {
        *self.location.lock() = path.to_string();
        println!("-> {}", path);
    }
}

impl Notifier for Console {
    fn notify(&self, notice: Notice) {
        println!("[{}] {}", notice.title, notice.description);
    }
}

fn print_help() {
    println!(
        "Commands:\n  login <email> <password>   sign in\n  logout                     sign out\n  whoami                     show the current identity\n  open <route>               navigate to a screen (e.g. /admin)\n  nav                        show the navigation bar\n  routes                     list screens\n  help                       show this help\n  quit | exit                leave"
    );
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("log filter")?;
    fmt().with_env_filter(filter).init();

    let cfg = AuthConfig::load()?;
    info!(
        target: "startup",
        "studyaid starting: override='{}/{}.json', login_route={}, remote_latency_ms={}",
        cfg.override_dir.display(), cfg.override_key, cfg.login_route, cfg.remote_latency_ms
    );
    if let Some(fb) = &cfg.fallback {
        warn!(target: "startup", email = %fb.email, "fallback admin credentials are enabled; set STUDYAID_FALLBACK=off to disable");
    }

    let rt = tokio::runtime::Runtime::new().context("tokio runtime")?;

    let store = Arc::new(MemoryIdentityStore::new().with_latency(std::time::Duration::from_millis(cfg.remote_latency_ms)));
    store.add_account(DEMO_STUDENT_EMAIL, DEMO_STUDENT_PASSWORD, Role::Student)?;
    let overrides = Arc::new(FileOverrideStore::new(&cfg.override_dir, &cfg.override_key));
    let reconciler = {
        // start() spawns the initial fetch onto the runtime
        let _enter = rt.enter();
        SessionReconciler::start(store, overrides, cfg.verifier())
    };

    let console = Arc::new(Console { location: Mutex::new(cfg.home_route.clone()) });
    let access = AccessGuard::new(reconciler.clone(), console.clone(), console.clone())
        .with_login_route(&cfg.login_route)
        .with_home_route(&cfg.home_route);
    let nav = NavBar::new(reconciler.clone(), console.clone(), console.clone(), &cfg.login_route);

    run_repl(&rt, &reconciler, &access, &nav, &console);
    reconciler.shutdown();
    Ok(())
}

fn run_repl(rt: &tokio::runtime::Runtime, reconciler: &Arc<SessionReconciler>, access: &AccessGuard, nav: &NavBar, console: &Console) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input = String::new();
    println!("Student Aid Central. Type 'help' for commands. Demo account: {} / {}", DEMO_STUDENT_EMAIL, DEMO_STUDENT_PASSWORD);
    loop {
        input.clear();
        print!("{}> ", console.location.lock().clone());
        let _ = stdout.flush();
        match stdin.read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(cmd) = parts.first() else { continue; };
        match cmd.to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "help" => print_help(),
            "login" => {
                if parts.len() < 3 { eprintln!("usage: login <email> <password>"); continue; }
                let req = LoginRequest::new(parts[1], parts[2]);
                if let Err(e) = req.validate() { eprintln!("{}", e.message()); continue; }
                match rt.block_on(reconciler.sign_in(&req.email, &req.password)) {
                    Ok(()) => println!("[Login Successful] Welcome back to Student Aid Central!"),
                    Err(e) => eprintln!("login failed: {}", e.message()),
                }
            }
            "logout" => rt.block_on(nav.logout()),
            "whoami" => {
                let state = rt.block_on(reconciler.wait_ready());
                match state.identity {
                    Some(id) => println!("{} ({}, {:?}) id={}", id.email, id.role, id.provenance, id.id),
                    None => println!("not signed in"),
                }
            }
            "nav" => {
                let links: Vec<&str> = nav.links().iter().map(|l| l.name).collect();
                let action = match nav.auth_action() {
                    AuthAction::Login { path } => format!("Login ({})", path),
                    AuthAction::Logout => "Logout".to_string(),
                };
                println!("{} | {}", links.join("  "), action);
            }
            "routes" => {
                for r in routes::ROUTES { println!("{:<20} {:<18} {:?}", r.path, r.name, r.access); }
            }
            "open" => {
                let Some(path) = parts.get(1) else { eprintln!("usage: open <route>"); continue; };
                let Some(route) = routes::find(path) else { eprintln!("no such screen: {}", path); continue; };
                let Some(mut guard) = route.guard(access) else {
                    console.navigate(route.path);
                    continue;
                };
                let mut view = guard.evaluate();
                while view.decision == Decision::Pending {
                    match rt.block_on(guard.next_change()) {
                        Some(v) => view = v,
                        None => break,
                    }
                }
                if view.decision.may_render() {
                    console.navigate(route.path);
                    println!("rendering {}", route.name);
                }
            }
            other => eprintln!("unknown command '{}'; type 'help'", other),
        }
    }
}
