use crate::bootstrap::App;
use crate::cli::{CacheCommand, Command, ShareCommand};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use strongbox_library::{NewDocument, Session, ShareAccess, ShareOptions, Strongbox};
use strongbox_storage::BlobReader;
use strongbox_store::{AccessLimit, Document, Share, User};
use time::format_description::well_known::Rfc3339;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

pub async fn run(app: &App, command: Command) -> Result<()> {
    let strongbox = &app.strongbox;
    match command {
        Command::Register { credentials, full_name } => {
            let user = strongbox
                .accounts
                .register(&credentials.email, &credentials.password, &full_name)
                .await
                .or_raise(|| ErrorKind::Operation("registration failed"))?;
            println!("registered {} ({})", user.email, user.id);
        },
        Command::Login { credentials } => {
            let session = strongbox
                .accounts
                .login(&credentials.email, &credentials.password)
                .await
                .or_raise(|| ErrorKind::Operation("login failed"))?;
            print_session(&session);
        },
        Command::Refresh { session } => {
            let session = strongbox
                .accounts
                .refresh(&session.token)
                .await
                .or_raise(|| ErrorKind::Operation("could not refresh session"))?;
            print_session(&session);
        },
        Command::Whoami { session } => {
            let user = authenticate(strongbox, &session.token).await?;
            print_user(&user);
        },
        Command::Upload { session, path, name, mime_type } => {
            let user = authenticate(strongbox, &session.token).await?;
            let document = upload(strongbox, &user, &path, name, mime_type).await?;
            print_document(&document);
        },
        Command::List { session } => {
            let user = authenticate(strongbox, &session.token).await?;
            let documents =
                strongbox.documents.list(user.id).await.or_raise(|| ErrorKind::Operation("could not list documents"))?;
            if documents.is_empty() {
                info!("no documents");
            }
            for document in &documents {
                println!("{}\t{}\t{}\t{}", document.id, document.size, document.mime_type, document.filename);
            }
        },
        Command::Info { session, document } => {
            let user = authenticate(strongbox, &session.token).await?;
            let document = strongbox
                .documents
                .get(user.id, document)
                .await
                .or_raise(|| ErrorKind::Operation("could not read document"))?;
            print_document(&document);
        },
        Command::Download { session, document, output } => {
            let user = authenticate(strongbox, &session.token).await?;
            let (document, stream) = strongbox
                .documents
                .download(user.id, document)
                .await
                .or_raise(|| ErrorKind::Operation("could not download document"))?;
            let written = write_out(stream, output.as_deref()).await?;
            info!(document = %document.id, bytes = written, "downloaded");
        },
        Command::Delete { session, document } => {
            let user = authenticate(strongbox, &session.token).await?;
            strongbox
                .documents
                .delete(user.id, document)
                .await
                .or_raise(|| ErrorKind::Operation("could not delete document"))?;
            println!("deleted {document}");
        },
        Command::Share { command } => share(strongbox, command).await?,
        Command::Cache { command: CacheCommand::PurgeShares } => {
            let removed = strongbox
                .repo
                .invalidate_all_shares()
                .await
                .or_raise(|| ErrorKind::Operation("could not purge cached shares"))?;
            println!("removed {removed} cached share(s)");
        },
        Command::Health => health(app).await?,
    }
    Ok(())
}

async fn share(strongbox: &Strongbox, command: ShareCommand) -> Result<()> {
    match command {
        ShareCommand::Create { session, document, days, hours, max_access, password } => {
            let user = authenticate(strongbox, &session.token).await?;
            let options = ShareOptions { days, hours, max_access, password };
            let share = strongbox
                .shares
                .create_share(user.id, document, options)
                .await
                .or_raise(|| ErrorKind::Operation("could not create share"))?;
            print_share(&share);
        },
        ShareCommand::Access { token, password, output } => {
            let access = strongbox
                .shares
                .access_share(&token, password.as_deref())
                .await
                .or_raise(|| ErrorKind::Operation("could not open share"))?;
            let granted = match access {
                ShareAccess::Granted(granted) => granted,
                ShareAccess::NotFound => exn::bail!(ErrorKind::Refused("no such share")),
                ShareAccess::Expired => exn::bail!(ErrorKind::Refused("the share has expired")),
                ShareAccess::Exhausted => exn::bail!(ErrorKind::Refused("the share has reached its access limit")),
                ShareAccess::PasswordRequired => exn::bail!(ErrorKind::Refused("a password is required")),
                ShareAccess::PasswordRejected => exn::bail!(ErrorKind::Refused("wrong password")),
            };
            info!(
                filename = %granted.filename,
                mime_type = %granted.mime_type,
                access_count = granted.access_count,
                "share opened"
            );
            let written = write_out(granted.stream, output.as_deref()).await?;
            if written != granted.size {
                warn!(expected = granted.size, actual = written, "shared document size differs from its metadata");
            }
        },
    }
    Ok(())
}

async fn authenticate(strongbox: &Strongbox, token: &str) -> Result<User> {
    strongbox.accounts.authenticate(token).await.or_raise(|| ErrorKind::Operation("not signed in"))
}

async fn upload(
    strongbox: &Strongbox,
    user: &User,
    path: &Path,
    name: Option<String>,
    mime_type: String,
) -> Result<Document> {
    let io = |err: std::io::Error| ErrorKind::Io(format!("{}: {err}", path.display()));
    let file = tokio::fs::File::open(path).await.map_err(io)?;
    let size = file.metadata().await.map_err(io)?.len();
    let filename = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ErrorKind::Io(format!("{} has no file name", path.display())))?,
    };
    let body: BlobReader = Box::pin(file);
    strongbox
        .documents
        .upload(user.id, NewDocument { filename, mime_type, size }, body)
        .await
        .or_raise(|| ErrorKind::Operation("upload failed"))
}

/// Copy `stream` to `output`, or to stdout when no path is given.
async fn write_out(mut stream: BlobReader, output: Option<&Path>) -> Result<u64> {
    match output {
        Some(path) => {
            let io = |err: std::io::Error| ErrorKind::Io(format!("{}: {err}", path.display()));
            let mut file = tokio::fs::File::create(path).await.map_err(io)?;
            let written = copy(&mut stream, &mut file).await?;
            file.sync_all().await.map_err(io)?;
            Ok(written)
        },
        None => copy(&mut stream, &mut tokio::io::stdout()).await,
    }
}

async fn copy<W: AsyncWrite + Unpin>(stream: &mut BlobReader, writer: &mut W) -> Result<u64> {
    let io = |err: std::io::Error| ErrorKind::Io(err.to_string());
    let written = tokio::io::copy(stream, writer).await.map_err(io)?;
    writer.flush().await.map_err(io)?;
    Ok(written)
}

async fn health(app: &App) -> Result<()> {
    let mut failures = Vec::new();
    match app.db.ping().await {
        Ok(()) => println!("store\tok"),
        Err(err) => {
            println!("store\tfailed: {err}");
            failures.push("store");
        },
    }
    if app.cache.is_enabled() {
        match app.cache.ping().await {
            Ok(()) => println!("cache\tok"),
            Err(err) => {
                println!("cache\tfailed: {err}");
                failures.push("cache");
            },
        }
    } else {
        println!("cache\tdisabled");
    }
    match app.blobs.probe(&app.bucket).await {
        Ok(()) => println!("blobs\tok ({}, bucket {})", app.blobs.name(), app.bucket),
        Err(err) => {
            println!("blobs\tfailed: {err}");
            failures.push("blobs");
        },
    }
    if !failures.is_empty() {
        exn::bail!(ErrorKind::Unhealthy(failures.join(", ")));
    }
    Ok(())
}

fn timestamp(at: time::UtcDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

fn print_session(session: &Session) {
    println!("{}", session.token);
    info!(user = %session.user.email, expires_at = %timestamp(session.expires_at), "session issued");
}

fn print_user(user: &User) {
    println!("id:         {}", user.id);
    println!("email:      {}", user.email);
    println!("name:       {}", user.full_name);
    println!("active:     {}", user.is_active);
    println!("created at: {}", timestamp(user.created_at));
}

fn print_document(document: &Document) {
    println!("id:         {}", document.id);
    println!("filename:   {}", document.filename);
    println!("media type: {}", document.mime_type);
    println!("size:       {}", document.size);
    println!("checksum:   {}", document.checksum);
    println!("created at: {}", timestamp(document.created_at));
}

fn print_share(share: &Share) {
    println!("token:      {}", share.token);
    println!("expires at: {}", timestamp(share.expires_at));
    match share.access_limit {
        AccessLimit::Unlimited => println!("accesses:   unlimited"),
        AccessLimit::Limited(max) => println!("accesses:   {max}"),
    }
    println!("password:   {}", if share.password_hash.is_some() { "required" } else { "none" });
}
