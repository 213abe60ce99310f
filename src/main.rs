use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use mailbridge::display::display_messages;
use mailbridge::{logging, settings, Flag, MailClient, MailObject};

#[derive(Parser, Debug)]
#[command(
    name = "mailbridge",
    version,
    about = "Send, read and flag mail over SMTP, IMAP and POP3"
)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "settings.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List inbox messages, headers only when --since is given
    List {
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Read messages by uid and save their attachments
    Read {
        #[arg(required = true)]
        uids: Vec<String>,
    },
    /// Compose and submit a message
    Send {
        #[arg(long, required = true, value_delimiter = ',')]
        to: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        cc: Vec<String>,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        attach: Vec<String>,
        #[arg(long)]
        include: Vec<String>,
        /// Placeholder substitution, KEY=VALUE replaces ###KEY### in the body
        #[arg(long = "set", value_parser = parse_key_value)]
        substitutions: Vec<(String, String)>,
    },
    /// Set or clear a flag on messages
    Flag {
        #[arg(value_enum)]
        change: FlagChange,
        #[arg(required = true)]
        uids: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FlagChange {
    Seen,
    Unseen,
    Flagged,
    Unflagged,
    Answered,
    Deleted,
    Undeleted,
}

impl FlagChange {
    fn flag_and_value(self) -> (Flag, bool) {
        match self {
            FlagChange::Seen => (Flag::Seen, true),
            FlagChange::Unseen => (Flag::Seen, false),
            FlagChange::Flagged => (Flag::Flagged, true),
            FlagChange::Unflagged => (Flag::Flagged, false),
            FlagChange::Answered => (Flag::Answered, true),
            FlagChange::Deleted => (Flag::Deleted, true),
            FlagChange::Undeleted => (Flag::Deleted, false),
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose)?;

    let settings = settings::load_settings(&cli.config)?;
    let account = &settings.account;
    let password = account.credential_store().password()?;
    let client = MailClient::new(settings.mail.clone());
    let user = account.user_name.as_str();

    match cli.command {
        Command::List { since } => {
            let messages = match since {
                Some(since) => {
                    client
                        .read_since(user, &password, since, &account.save_attach_path)
                        .await?
                }
                None => client.read_all(user, &password, &account.save_attach_path).await?,
            };
            display_messages(&messages);
        }
        Command::Read { uids } => {
            let messages = client
                .read_many(user, &password, &uids, &account.save_attach_path)
                .await?;
            display_messages(&messages);
        }
        Command::Send {
            to,
            cc,
            subject,
            body,
            content_type,
            attach,
            include,
            substitutions,
        } => {
            let mut mail = MailObject {
                subject,
                content: body,
                content_map: substitutions.into_iter().collect::<BTreeMap<_, _>>(),
                receive_address: to,
                cc_address: (!cc.is_empty()).then_some(cc),
                attach_files: attach,
                include_files: include,
                ..MailObject::default()
            };
            if let Some(content_type) = content_type {
                mail.content_type = content_type;
            }
            if !client.send(&mail, user, &password).await? {
                bail!("Message was not sent, a listed file could not be read");
            }
            info!("Message sent");
        }
        Command::Flag { change, uids } => {
            let (flag, value) = change.flag_and_value();
            let updated = client.set_status(user, &password, &uids, flag, value).await?;
            info!("Updated {} of {} message(s)", updated, uids.len());
        }
    }

    Ok(())
}
