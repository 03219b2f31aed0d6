use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use linewire_client::{BoxError, Client, Context};
use linewire_codec::FsStorage;
use linewire_transport::UnixSocketListener;
use tracing::{info, warn};

use crate::cmd::{Globals, ServeArgs};
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_request, OutputFormat};

enum Stop {
    Signal,
    Done,
    Failed(CliError),
}

struct Session {
    cmds: Vec<String>,
    limit: Option<usize>,
    served: AtomicUsize,
    running: AtomicBool,
    storage: FsStorage,
    format: OutputFormat,
    stop: mpsc::Sender<Stop>,
}

pub fn run(args: ServeArgs, globals: &Globals) -> CliResult<i32> {
    let listener =
        UnixSocketListener::bind(&args.path).map_err(|err| transport_error("bind failed", &err))?;
    info!(path = %args.path.display(), commands = ?args.cmds, "serving");

    let (tx, rx) = mpsc::channel();
    install_ctrlc_handler(tx.clone())?;

    let session = Arc::new(Session {
        cmds: args.cmds,
        limit: args.count,
        served: AtomicUsize::new(0),
        running: AtomicBool::new(true),
        storage: globals.storage(),
        format: globals.format,
        stop: tx,
    });

    let accept = {
        let session = Arc::clone(&session);
        thread::Builder::new()
            .name("linewire-accept".to_string())
            .spawn(move || accept_loop(listener, &session))
            .map_err(|err| CliError::new(INTERNAL, format!("accept thread failed: {err}")))?
    };

    let stop = rx.recv().unwrap_or(Stop::Signal);
    shutdown(&session, &args.path);
    let _ = accept.join();

    match stop {
        Stop::Signal | Stop::Done => Ok(SUCCESS),
        Stop::Failed(err) => Err(err),
    }
}

/// Stop accepting and drop the listener so its socket file is removed.
fn shutdown(session: &Session, path: &Path) {
    session.running.store(false, Ordering::SeqCst);
    // Wakes the accept loop if it is blocked in `accept`.
    let _ = UnixStream::connect(path);
}

fn accept_loop(listener: UnixSocketListener, session: &Arc<Session>) {
    let mut clients: Vec<Client> = Vec::new();
    while session.running.load(Ordering::SeqCst) {
        let connector = match listener.accept() {
            Ok(connector) => connector,
            Err(err) => {
                let _ = session
                    .stop
                    .send(Stop::Failed(transport_error("accept failed", &err)));
                return;
            }
        };
        if !session.running.load(Ordering::SeqCst) {
            break;
        }

        let client = Client::builder(connector)
            .with_storage(session.storage.clone())
            .build();
        for cmd in &session.cmds {
            let session = Arc::clone(session);
            client.register(cmd, move |ctx| echo(ctx, &session));
        }
        if let Err(err) = client.get_connection() {
            warn!(error = %err, "accepted connection failed");
            continue;
        }
        clients.retain(Client::is_open);
        clients.push(client);
    }
}

fn echo(ctx: &Context, session: &Session) -> Result<(), BoxError> {
    let value = ctx.decode()?;
    ctx.reply(&value)?;
    print_request(&ctx.cmd(), &ctx.msg_id(), ctx.mode(), session.format);

    let served = session.served.fetch_add(1, Ordering::SeqCst) + 1;
    if session.limit.is_some_and(|limit| served >= limit) {
        let _ = session.stop.send(Stop::Done);
    }
    Ok(())
}

fn install_ctrlc_handler(stop: mpsc::Sender<Stop>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = stop.send(Stop::Signal);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
