use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    approval::ModeratedUnit, load_settings, load_units_by_type, ApprovalPanel, ApprovalWorkflow,
    Attempt, HttpOrganizationMembers, MemberRoster, RegistryClient, Removal, Settings, Viewer,
};
use serde::Serialize;
use shared::{
    domain::{
        BranchAddress, InstitutionId, Member, MemberId, MemberRole, OrganizationId, ParentKind,
        ParentRef, Unit, UnitId,
    },
    protocol::{NewUnit, UnitPatch},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "unitctl", about = "Manage institution and organization units")]
struct Cli {
    /// Settings file (defaults to ./unitctl.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the compiled-in unit type catalog.
    Catalog {
        #[arg(long, value_enum, default_value = "institution")]
        parent: ParentKindArg,
    },
    #[command(subcommand)]
    Units(UnitsCommand),
    /// List pending units of an institution across every unit type.
    Pending {
        #[arg(long)]
        institution: i64,
    },
    Approve {
        #[arg(long = "type")]
        unit_type: String,
        #[arg(long)]
        id: i64,
    },
    Reject {
        #[arg(long = "type")]
        unit_type: String,
        #[arg(long)]
        id: i64,
        #[arg(long, default_value = "")]
        reason: String,
    },
    #[command(subcommand)]
    Members(MembersCommand),
}

#[derive(Subcommand, Debug)]
enum UnitsCommand {
    /// List units of one type, or of every type when `--type` is omitted.
    List {
        #[command(flatten)]
        parent: ParentArgs,
        #[arg(long = "type")]
        unit_type: Option<String>,
    },
    Create {
        #[command(flatten)]
        parent: ParentArgs,
        #[arg(long = "type")]
        unit_type: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        address: AddressArgs,
    },
    Show {
        #[arg(long)]
        institution: i64,
        #[arg(long = "type")]
        unit_type: String,
        #[arg(long)]
        id: i64,
    },
    Update {
        #[arg(long)]
        institution: i64,
        #[arg(long = "type")]
        unit_type: String,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        address: AddressArgs,
    },
    Delete {
        #[arg(long = "type")]
        unit_type: String,
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum MembersCommand {
    List {
        #[arg(long)]
        organization: i64,
    },
    SetTitle {
        #[arg(long)]
        organization: i64,
        #[arg(long)]
        member: i64,
        #[arg(long)]
        title: String,
    },
    SetRole {
        #[arg(long)]
        organization: i64,
        #[arg(long)]
        member: i64,
        #[arg(long)]
        role: MemberRole,
    },
    Remove {
        #[arg(long)]
        organization: i64,
        #[arg(long)]
        member: i64,
        /// Skip the interactive confirmation.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ParentArgs {
    #[arg(long)]
    institution: Option<i64>,
    #[arg(long)]
    organization: Option<i64>,
}

impl ParentArgs {
    fn parent(&self) -> Result<ParentRef> {
        match (self.institution, self.organization) {
            (Some(id), None) => Ok(ParentRef::Institution(InstitutionId(id))),
            (None, Some(id)) => Ok(ParentRef::Organization(OrganizationId(id))),
            _ => bail!("exactly one of --institution or --organization is required"),
        }
    }
}

#[derive(Args, Debug, Default)]
struct AddressArgs {
    /// Branches only.
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    postal_code: Option<String>,
}

impl AddressArgs {
    fn into_address(self) -> Option<BranchAddress> {
        let address = BranchAddress {
            address: self.address,
            city: self.city,
            country: self.country,
            postal_code: self.postal_code,
        };
        (!address.is_empty()).then_some(address)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ParentKindArg {
    Institution,
    Organization,
}

impl From<ParentKindArg> for ParentKind {
    fn from(value: ParentKindArg) -> Self {
        match value {
            ParentKindArg::Institution => ParentKind::Institution,
            ParentKindArg::Organization => ParentKind::Organization,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    debug!(
        base_url = %settings.api_base_url,
        authenticated = settings.access_token.is_some(),
        "resolved settings"
    );
    let output = Output { json: cli.json };
    let registry = RegistryClient::from_settings(&settings);

    match cli.command {
        Command::Catalog { parent } => {
            let kind = ParentKind::from(parent);
            output.emit(&kind.catalog(), || {
                for unit_type in kind.catalog() {
                    println!(
                        "{:<12} {:<12} {}/{}/ (code field: {})",
                        unit_type.key,
                        unit_type.label,
                        kind.api_prefix(),
                        unit_type.endpoint,
                        unit_type.code_field()
                    );
                }
            })?;
        }
        Command::Units(command) => run_units(&registry, &output, command).await?,
        Command::Pending { institution } => {
            let workflow = ApprovalWorkflow::new(Arc::new(registry), operator());
            let report = workflow
                .load_pending_across_types(InstitutionId(institution))
                .await;
            for unit_type in &report.failed_types {
                eprintln!("warning: could not load pending {unit_type} units");
            }
            match workflow.panel().await {
                ApprovalPanel::Ready(index) => output.emit(&index, || {
                    for group in index.groups() {
                        println!("{} ({})", group.unit_type.label, group.units.len());
                        for unit in &group.units {
                            println!("  {}", describe_unit(unit));
                        }
                    }
                })?,
                ApprovalPanel::Failed(message) => bail!(message),
                ApprovalPanel::Empty | ApprovalPanel::Hidden | ApprovalPanel::Loading => {
                    output.emit(&serde_json::json!({}), || println!("No pending units."))?
                }
            }
        }
        Command::Approve { unit_type, id } => {
            let workflow = ApprovalWorkflow::new(Arc::new(registry), operator());
            let attempt = workflow
                .approve(UnitId(id), &unit_type)
                .await
                .with_context(|| format!("failed to approve {unit_type} {id}"))?;
            report_moderation(&output, attempt)?;
        }
        Command::Reject {
            unit_type,
            id,
            reason,
        } => {
            let workflow = ApprovalWorkflow::new(Arc::new(registry), operator());
            let attempt = workflow
                .reject(UnitId(id), &unit_type, &reason)
                .await
                .with_context(|| format!("failed to reject {unit_type} {id}"))?;
            report_moderation(&output, attempt)?;
        }
        Command::Members(command) => run_members(&settings, &output, command).await?,
    }

    Ok(())
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(base_url) = &cli.base_url {
        settings.api_base_url = client_core::config::normalize_base_url(base_url)?;
    }
    if let Some(token) = &cli.token {
        settings.access_token = Some(token.clone());
    }
    Ok(settings)
}

/// Operators of this tool act with moderation rights; the API still decides.
fn operator() -> Viewer {
    Viewer {
        email: None,
        is_staff: true,
        is_superuser: false,
    }
}

async fn run_units(registry: &RegistryClient, output: &Output, command: UnitsCommand) -> Result<()> {
    match command {
        UnitsCommand::List { parent, unit_type } => {
            let parent = parent.parent()?;
            match unit_type {
                Some(unit_type) => {
                    let units = registry
                        .list_units(parent, &unit_type)
                        .await
                        .with_context(|| format!("failed to list {unit_type} units"))?;
                    output.emit(&units, || print_units(&units))?;
                }
                None => {
                    let tab = load_units_by_type(registry, parent).await;
                    output.emit(&tab, || {
                        for entry in &tab.entries {
                            println!("{} ({})", entry.unit_type.label, entry.units.len());
                            for unit in &entry.units {
                                println!("  {}", describe_unit(unit));
                            }
                        }
                        for unit_type in &tab.failed_types {
                            println!("{unit_type}: failed to load");
                        }
                    })?;
                }
            }
        }
        UnitsCommand::Create {
            parent,
            unit_type,
            name,
            code,
            description,
            address,
        } => {
            let parent = parent.parent()?;
            let outcome = registry
                .create_unit(
                    parent,
                    &unit_type,
                    &NewUnit {
                        name,
                        code,
                        description,
                        address: address.into_address(),
                    },
                )
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            output.emit(&outcome, || println!("{}", outcome.message()))?;
        }
        UnitsCommand::Show {
            institution,
            unit_type,
            id,
        } => {
            let unit = registry
                .get_unit(InstitutionId(institution), &unit_type, UnitId(id))
                .await
                .with_context(|| format!("failed to fetch {unit_type} {id}"))?;
            output.emit(&unit, || println!("{}", describe_unit(&unit)))?;
        }
        UnitsCommand::Update {
            institution,
            unit_type,
            id,
            name,
            code,
            description,
            address,
        } => {
            let patch = UnitPatch {
                name,
                code,
                description,
                address: address.into_address(),
            };
            if patch.is_empty() {
                bail!("nothing to update");
            }
            let unit = registry
                .update_unit(InstitutionId(institution), &unit_type, UnitId(id), &patch)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            output.emit(&unit, || println!("updated {}", describe_unit(&unit)))?;
        }
        UnitsCommand::Delete { unit_type, id } => {
            registry
                .delete_unit(&unit_type, UnitId(id))
                .await
                .with_context(|| format!("failed to delete {unit_type} {id}"))?;
            output.emit(&serde_json::json!({ "deleted": id }), || {
                println!("deleted {unit_type} {id}")
            })?;
        }
    }
    Ok(())
}

async fn run_members(settings: &Settings, output: &Output, command: MembersCommand) -> Result<()> {
    let service = Arc::new(HttpOrganizationMembers::from_settings(settings));
    let organization = match &command {
        MembersCommand::List { organization }
        | MembersCommand::SetTitle { organization, .. }
        | MembersCommand::SetRole { organization, .. }
        | MembersCommand::Remove { organization, .. } => OrganizationId(*organization),
    };
    let roster = MemberRoster::new(service, organization);
    let members = roster
        .list_members()
        .await
        .with_context(|| format!("failed to load members of organization {organization}"))?;

    match command {
        MembersCommand::List { .. } => {
            output.emit(&members, || {
                for member in &members {
                    println!("{}", describe_member(member));
                }
            })?;
        }
        MembersCommand::SetTitle { member, title, .. } => {
            let attempt = roster
                .set_title(MemberId(member), &title)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            report_member(output, attempt)?;
        }
        MembersCommand::SetRole { member, role, .. } => {
            let attempt = roster
                .set_role(MemberId(member), role)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            report_member(output, attempt)?;
        }
        MembersCommand::Remove { member, yes, .. } => {
            let confirm = move |target: &Member| yes || prompt_removal(target);
            let attempt = roster
                .remove_member(MemberId(member), &confirm)
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            match attempt {
                Attempt::Completed(Removal::Removed(removed)) => {
                    output.emit(&removed, || println!("removed {}", describe_member(&removed)))?
                }
                Attempt::Completed(Removal::Cancelled) => println!("removal cancelled"),
                Attempt::Suppressed => println!("removal already in progress"),
            }
        }
    }
    Ok(())
}

fn prompt_removal(member: &Member) -> bool {
    print!(
        "Remove {} <{}> from the organization? This cannot be undone. [y/N] ",
        member.user_name, member.user_email
    );
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn report_moderation(output: &Output, attempt: Attempt<ModeratedUnit>) -> Result<()> {
    match attempt {
        Attempt::Completed(moderated) => output.emit(&moderated, || {
            println!(
                "{} {} is now {:?}",
                moderated.unit_type, moderated.unit_id, moderated.status
            )
        }),
        Attempt::Suppressed => {
            println!("action already in progress");
            Ok(())
        }
    }
}

fn report_member(output: &Output, attempt: Attempt<Member>) -> Result<()> {
    match attempt {
        Attempt::Completed(member) => {
            output.emit(&member, || println!("updated {}", describe_member(&member)))
        }
        Attempt::Suppressed => {
            println!("update already in progress");
            Ok(())
        }
    }
}

fn print_units(units: &[Unit]) {
    if units.is_empty() {
        println!("No units.");
    }
    for unit in units {
        println!("{}", describe_unit(unit));
    }
}

fn describe_unit(unit: &Unit) -> String {
    let mut line = format!(
        "#{} {} [{}] {:?}",
        unit.id,
        unit.name,
        unit.code.as_deref().unwrap_or("-"),
        unit.approval_status
    );
    if let Some(email) = &unit.created_by_email {
        line.push_str(&format!(" by {email}"));
    }
    line
}

fn describe_member(member: &Member) -> String {
    format!(
        "#{} {} <{}> {}{}",
        member.id,
        member.user_name,
        member.user_email,
        member.role.label(),
        member
            .title
            .as_deref()
            .map(|title| format!(" ({title})"))
            .unwrap_or_default()
    )
}

struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }
}
