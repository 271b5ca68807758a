use crate::cli::{AccountsCommand, Cli, Command, LsArgs};
use crate::error::{ErrorKind, RaiseExt, Result};
use crate::output::{entry_row, print_status};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_config::{AccountStore, KeyringStore, Settings};
use strata_storage::backend::find_bucket;
use strata_storage::expand::links;
use strata_storage::key::DELIMITER;
use strata_storage::{AccountHandle, BucketExt, BucketHandle, Credential, Entry, EntryMeta, ListQuery};
use strata_transfer::{Completion, DeleteSet, DownloadSet, Task, TaskList, TaskOutcome, UploadItem, UploadSet};

struct Context {
    settings: Settings,
    accounts: AccountStore,
}

impl Context {
    fn load(config: Option<&Path>) -> Result<Self> {
        let settings = match config {
            Some(path) => Settings::load_from(Some(path)),
            None => Settings::load(),
        }
        .or_command(ErrorKind::Config)?;
        let accounts = AccountStore::new(KeyringStore::new(&settings.keyring_service));
        Ok(Self { settings, accounts })
    }

    async fn account(&self, name: &str) -> Result<AccountHandle> {
        let credential = self
            .accounts
            .find(name)
            .or_command(ErrorKind::Config)?
            .ok_or_raise(|| ErrorKind::UnknownAccount(name.to_string()))?;
        credential.connect().await.or_command(ErrorKind::Storage)
    }

    async fn bucket(&self, account: &str, bucket: &str) -> Result<BucketHandle> {
        let account = self.account(account).await?;
        find_bucket(&account, bucket)
            .await
            .or_command(ErrorKind::Storage)?
            .ok_or_raise(|| ErrorKind::UnknownBucket(bucket.to_string()))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = Context::load(cli.config.as_deref())?;
    match cli.command {
        Command::Accounts(command) => accounts(&context, command),
        Command::Buckets { account } => {
            let account = context.account(&account).await?;
            for bucket in account.list_buckets().await.or_command(ErrorKind::Storage)? {
                println!("{}", bucket.name());
            }
            Ok(())
        },
        Command::Ls(args) => ls(&context, args).await,
        Command::Upload { account, bucket, prefix, paths } => {
            let bucket = context.bucket(&account, &bucket).await?;
            let mut items = Vec::new();
            for path in &paths {
                match path.is_dir() {
                    true => items.extend(UploadItem::from_dir(path).await.or_command(ErrorKind::Input)?),
                    false => items.push(UploadItem::from_path(path).await.or_command(ErrorKind::Input)?),
                }
            }
            run_task(UploadSet::new(bucket, prefix, items)).await
        },
        Command::Download { account, bucket, keys, dest } => {
            let bucket = context.bucket(&account, &bucket).await?;
            let entries = resolve(&bucket, &keys).await?;
            let dest = dest
                .or_else(|| context.settings.download_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            run_task(DownloadSet::new(entries, dest)).await
        },
        Command::Rm { account, bucket, prefixes } => {
            let bucket = context.bucket(&account, &bucket).await?;
            run_task(DeleteSet::new(bucket, prefixes)).await
        },
        Command::Link { account, bucket, keys, hours } => {
            let bucket = context.bucket(&account, &bucket).await?;
            let entries = resolve(&bucket, &keys).await?;
            let lifetime = link_lifetime(hours, context.settings.link_lifetime())?;
            for link in links(&entries, lifetime).await.or_command(ErrorKind::Storage)? {
                println!("{}\t{}", link.key, link.url);
            }
            Ok(())
        },
    }
}

fn accounts(context: &Context, command: AccountsCommand) -> Result<()> {
    let credential = match command {
        AccountsCommand::List => {
            for credential in context.accounts.load().or_command(ErrorKind::Config)? {
                println!("{}\t{}", credential.display_name(), credential.kind());
            }
            return Ok(());
        },
        AccountsCommand::Remove { name } => {
            if !context.accounts.remove(&name).or_command(ErrorKind::Config)? {
                exn::bail!(ErrorKind::UnknownAccount(name));
            }
            return Ok(());
        },
        AccountsCommand::AddS3 { name, access_key, secret, endpoint, region } => {
            Credential::S3 { name, access_key, secret, endpoint, region }
        },
        AccountsCommand::AddAzure { name, connection_string, containers } => {
            Credential::AzureBlob { name, connection_string, containers }
        },
        AccountsCommand::AddGcs { name, service_account, buckets } => {
            let service_account = std::fs::read_to_string(&service_account)
                .or_raise(|| ErrorKind::Input(format!("cannot read {}", service_account.display())))?;
            Credential::GoogleCloud { name, service_account, buckets }
        },
    };
    credential.validate().or_command(ErrorKind::Input)?;
    context.accounts.add(credential.clone()).or_command(ErrorKind::Config)?;
    eprintln!("saved account '{}'", credential.display_name());
    Ok(())
}

async fn ls(context: &Context, args: LsArgs) -> Result<()> {
    if args.page == 0 {
        exn::bail!(ErrorKind::Input("pages start at 1".to_string()));
    }
    let bucket = context.bucket(&args.account, &args.bucket).await?;
    let query = ListQuery::new(args.prefix)
        .hierarchical(!args.flat)
        .with_page_size(args.page_size.unwrap_or(context.settings.page_size))
        .or_command(ErrorKind::Input)?;
    let mut page = bucket.list_entries(query).await.or_command(ErrorKind::Storage)?;
    while page.page_number() < args.page {
        if !page.has_next_page() {
            exn::bail!(ErrorKind::Input(format!("there are only {} pages", page.page_number())));
        }
        page = page.next_page().await.or_command(ErrorKind::Storage)?;
    }
    for (offset, entry) in page.numbered() {
        println!("{}", entry_row(offset, entry));
    }
    let more = match page.has_next_page() {
        true => format!(", more with --page {}", page.page_number() + 1),
        false => String::new(),
    };
    eprintln!("page {}: {} entries{more}", page.page_number(), page.len());
    Ok(())
}

/// Lifetime of signed links: `--hours` when given, else `default`.
fn link_lifetime(hours: Option<u64>, default: Duration) -> Result<Duration> {
    let Some(hours) = hours else {
        return Ok(default);
    };
    match hours.checked_mul(60 * 60) {
        Some(0) => exn::bail!(ErrorKind::Input("--hours must be at least 1".to_string())),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => exn::bail!(ErrorKind::Input(format!("--hours {hours} is too large"))),
    }
}

/// Turn command-line keys into entries. Keys ending in the delimiter are
/// directories; anything else must name an existing blob.
async fn resolve(bucket: &BucketHandle, keys: &[String]) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        if key.ends_with(DELIMITER) {
            entries.push(Entry::new(bucket.clone(), EntryMeta::directory(key.clone())));
            continue;
        }
        let blob = bucket
            .list_all_entries(key)
            .await
            .or_command(ErrorKind::Storage)?
            .into_iter()
            .find(|entry| entry.key == *key && !entry.is_directory())
            .ok_or_raise(|| ErrorKind::UnknownKey(key.clone()))?;
        entries.push(blob);
    }
    Ok(entries)
}

/// Run one task to completion, showing its status on stderr. Ctrl-C asks the
/// task to stop.
async fn run_task(task: impl Into<Task>) -> Result<()> {
    let mut tasks = TaskList::new();
    let id = tasks.start(task);
    let mut status = tasks.subscribe(id).ok_or_raise(|| ErrorKind::Transfer("task is not running".to_string()))?;
    let cancel = tasks.cancel_token(id).ok_or_raise(|| ErrorKind::Transfer("task is not running".to_string()))?;
    print_status(&status.borrow_and_update());

    let mut watching = true;
    let mut interruptible = true;
    let completion = loop {
        tokio::select! {
            biased;
            completion = tasks.next_completion() => break completion,
            interrupted = tokio::signal::ctrl_c(), if interruptible => {
                interruptible = false;
                match interrupted {
                    Ok(()) => {
                        tracing::info!(%id, "interrupted, cancelling task");
                        cancel.cancel();
                    },
                    Err(err) => tracing::warn!(error = %err, "cannot listen for ctrl-c"),
                }
            },
            changed = status.changed(), if watching => match changed {
                Ok(()) => print_status(&status.borrow_and_update()),
                Err(_) => watching = false,
            },
        }
    };
    print_status(&status.borrow());
    eprintln!();

    let Some(Completion { outcome, .. }) = completion else {
        exn::bail!(ErrorKind::Transfer("task ended without an outcome".to_string()));
    };
    match outcome {
        TaskOutcome::Succeeded { .. } => Ok(()),
        TaskOutcome::Failed { message, .. } => exn::bail!(ErrorKind::Transfer(message)),
        TaskOutcome::Cancelled { .. } => exn::bail!(ErrorKind::Cancelled),
    }
}
