use aims_core::{AcademicRecord, Enrollment, EnrollmentEvent, EnrollmentStatus, Grade};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// aims: command-line client for the academic information service
#[derive(Parser, Debug)]
#[command(name = "aims")]
#[command(about = "Enrollment approvals and academic records from the terminal", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Base URL of the AIMS server
    #[arg(long, env = "AIMS_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Acting user id
    #[arg(long, env = "AIMS_USER")]
    user: Option<String>,

    /// Acting role
    #[arg(long, env = "AIMS_ROLE", value_parser = ["student", "instructor", "advisor", "admin"])]
    role: Option<String>,

    /// Bearer token, when the server requires one
    #[arg(long, env = "AIMS_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List enrollments of an offering, a student, or an advisor's advisees
    Enrollments(ListArgs),
    /// Show one enrollment
    Show(IdArgs),
    /// Show the transition history of an enrollment
    History(IdArgs),
    /// Move an enrollment to a target status
    Transition(TransitionArgs),
    /// Approve a pending enrollment
    Approve(ActionArgs),
    /// Reject a pending enrollment
    Reject(ActionArgs),
    /// Withdraw from an enrolled course
    Withdraw(ActionArgs),
    /// Drop an enrollment
    Drop(ActionArgs),
    /// Approve every pending request of an offering or of an advisor's advisees
    ApproveAll(ApproveAllArgs),
    /// Show a student's academic record
    Record(RecordArgs),
}

#[derive(Parser, Debug)]
#[command(group(clap::ArgGroup::new("scope").required(true).multiple(true).args(["offering", "student", "advisor"])))]
struct ListArgs {
    /// Offering id
    #[arg(long)]
    offering: Option<String>,

    /// Student id
    #[arg(long)]
    student: Option<String>,

    /// Advisor id
    #[arg(long)]
    advisor: Option<String>,

    /// Only show enrollments in this status
    #[arg(long)]
    status: Option<String>,
}

#[derive(Parser, Debug)]
struct IdArgs {
    /// Enrollment id
    id: String,
}

#[derive(Parser, Debug)]
struct TransitionArgs {
    /// Enrollment id
    id: String,

    /// Target status, e.g. "pending advisor approval" or enrolled
    status: String,

    /// Fail with a conflict unless the enrollment is still in this status
    #[arg(long)]
    expected: Option<String>,

    /// Grade to post; only with target status `completed`
    #[arg(long)]
    grade: Option<String>,
}

#[derive(Parser, Debug)]
struct ActionArgs {
    /// Enrollment id
    id: String,

    /// Fail with a conflict unless the enrollment is still in this status
    #[arg(long)]
    expected: Option<String>,
}

#[derive(Parser, Debug)]
#[command(group(clap::ArgGroup::new("scope").required(true).multiple(true).args(["offering", "advisor"])))]
struct ApproveAllArgs {
    /// Offering id (alone: instructor approval; with --advisor: restrict to this offering)
    #[arg(long)]
    offering: Option<String>,

    /// Advisor id
    #[arg(long)]
    advisor: Option<String>,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Student id
    student: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    enrollment_id: String,
    #[serde(default)]
    status: Option<EnrollmentStatus>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct BulkOutcome {
    succeeded: usize,
    failed: usize,
    results: Vec<BulkItem>,
}

/// Normalize a status given on the command line to its wire form.
fn canonical_status(value: &str) -> Result<&'static str> {
    let status: EnrollmentStatus = value.parse().map_err(|e| anyhow!("{}", e))?;
    Ok(status.as_str())
}

fn canonical_grade(value: &str) -> Result<&'static str> {
    let grade: Grade = value.parse().map_err(|e| anyhow!("{}", e))?;
    Ok(grade.as_str())
}

/// Turn an error response into a readable message.
fn describe_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => anyhow!(
            "{} ({}): {}",
            parsed.error.code,
            status.as_u16(),
            parsed.error.message
        ),
        Err(_) => anyhow!("AIMS server error: {} - {}", status, body),
    }
}

struct AimsClient {
    http: reqwest::Client,
    base_url: String,
    connection: ConnectionArgs,
}

impl AimsClient {
    fn new(connection: ConnectionArgs) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            base_url: connection.url.trim_end_matches('/').to_string(),
            connection,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let user = self
            .connection
            .user
            .as_deref()
            .context("Acting user must be provided via --user or AIMS_USER")?;
        let role = self
            .connection
            .role
            .as_deref()
            .context("Acting role must be provided via --role or AIMS_ROLE")?;

        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-aims-user", user)
            .header("x-aims-role", role);
        if let Some(token) = &self.connection.api_token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .context("Failed to send request to AIMS server")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .context("Failed to read error response")?;
            return Err(describe_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .context("Failed to parse AIMS server response")
    }
}

fn print_enrollments(enrollments: &[Enrollment]) {
    if enrollments.is_empty() {
        println!("No enrollments.");
        return;
    }
    for e in enrollments {
        println!(
            "{}  {:<14} {:<12} {:<24} {:<28} {}",
            e.enrollment_id,
            e.student_id.as_str(),
            e.offering_id.as_str(),
            e.enrol_type.as_str(),
            e.enrol_status.as_str(),
            e.grade.map(|g| g.as_str()).unwrap_or("-")
        );
    }
}

fn print_enrollment(e: &Enrollment) {
    println!("Enrollment: {}", e.enrollment_id);
    println!("  Student:  {}", e.student_id);
    println!("  Offering: {}", e.offering_id);
    println!("  Type:     {}", e.enrol_type);
    println!("  Status:   {}", e.enrol_status);
    if let Some(grade) = e.grade {
        println!("  Grade:    {}", grade);
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_bulk(outcome: &BulkOutcome) {
    for item in &outcome.results {
        match (&item.status, &item.error) {
            (_, Some(error)) => println!(
                "  FAILED   {}  {}: {}",
                item.enrollment_id, error.code, error.message
            ),
            (Some(status), None) => println!("  ok       {}  -> {}", item.enrollment_id, status),
            (None, None) => println!("  ok       {}", item.enrollment_id),
        }
    }
    println!("{} approved, {} failed", outcome.succeeded, outcome.failed);
}

fn print_record(record: &AcademicRecord) {
    println!("Academic record of {}", record.student_id);
    for entry in &record.entries {
        println!(
            "  {:<10} {:<8} {:<32} {:>4} {:<24} {}",
            entry.course_code.as_str(),
            entry.session,
            entry.title,
            entry.credits,
            entry.enrol_type.as_str(),
            entry.grade
        );
    }
    println!("Credits earned: {}", record.credits_earned);
    println!("CGPA:           {:.2}", record.cgpa);
}

async fn run_enrollments(client: &AimsClient, args: ListArgs) -> Result<()> {
    let (path, scoped_offering) = match (&args.offering, &args.student, &args.advisor) {
        (Some(offering), None, None) => (format!("/api/offerings/{}/enrollments", offering), None),
        (None, Some(student), None) => (format!("/api/students/{}/enrollments", student), None),
        (offering, None, Some(advisor)) => (
            format!("/api/advisors/{}/enrollments", advisor),
            offering.clone(),
        ),
        _ => bail!("Give exactly one of --offering, --student or --advisor"),
    };

    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(status) = &args.status {
        query.push(("status", canonical_status(status)?.to_string()));
    }
    if let Some(offering) = scoped_offering {
        query.push(("offering_id", offering));
    }

    let mut enrollments: Vec<Enrollment> = client
        .send(client.request(Method::GET, &path)?.query(&query))
        .await?;
    // The student endpoint has no server-side status filter.
    if let Some(status) = &args.status {
        let wanted: EnrollmentStatus = status.parse().map_err(|e| anyhow!("{}", e))?;
        enrollments.retain(|e| e.enrol_status == wanted);
    }
    print_enrollments(&enrollments);
    Ok(())
}

async fn run_history(client: &AimsClient, args: IdArgs) -> Result<()> {
    let events: Vec<EnrollmentEvent> = client
        .send(client.request(Method::GET, &format!("/api/enrollments/{}/history", args.id))?)
        .await?;
    if events.is_empty() {
        println!("No transitions recorded.");
    }
    for event in events {
        println!(
            "{}  {} -> {}  by {} ({})",
            format_timestamp(event.recorded_at),
            event.from_status,
            event.to_status,
            event.actor_id,
            event.actor_role
        );
    }
    Ok(())
}

async fn run_transition(client: &AimsClient, args: TransitionArgs) -> Result<()> {
    let mut body = json!({ "status": canonical_status(&args.status)? });
    if let Some(expected) = &args.expected {
        body["expected_status"] = json!(canonical_status(expected)?);
    }
    if let Some(grade) = &args.grade {
        body["grade"] = json!(canonical_grade(grade)?);
    }
    let enrollment: Enrollment = client
        .send(
            client
                .request(Method::PATCH, &format!("/api/enrollments/{}", args.id))?
                .json(&body),
        )
        .await?;
    print_enrollment(&enrollment);
    Ok(())
}

async fn run_action(client: &AimsClient, action: &str, args: ActionArgs) -> Result<()> {
    let mut body = json!({});
    if let Some(expected) = &args.expected {
        body["expected_status"] = json!(canonical_status(expected)?);
    }
    let enrollment: Enrollment = client
        .send(
            client
                .request(
                    Method::POST,
                    &format!("/api/enrollments/{}/{}", args.id, action),
                )?
                .json(&body),
        )
        .await?;
    print_enrollment(&enrollment);
    Ok(())
}

async fn run_approve_all(client: &AimsClient, args: ApproveAllArgs) -> Result<()> {
    let builder = match (&args.advisor, &args.offering) {
        (Some(advisor), offering) => {
            let builder = client.request(
                Method::POST,
                &format!("/api/advisors/{}/enrollments/approve-all", advisor),
            )?;
            match offering {
                Some(offering) => builder.query(&[("offering_id", offering)]),
                None => builder,
            }
        }
        (None, Some(offering)) => client.request(
            Method::POST,
            &format!("/api/offerings/{}/enrollments/approve-all", offering),
        )?,
        (None, None) => bail!("Give --offering, --advisor, or both"),
    };
    let outcome: BulkOutcome = client.send(builder).await?;
    print_bulk(&outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = AimsClient::new(cli.connection)?;

    match cli.command {
        Commands::Enrollments(args) => run_enrollments(&client, args).await,
        Commands::Show(args) => {
            let enrollment: Enrollment = client
                .send(client.request(Method::GET, &format!("/api/enrollments/{}", args.id))?)
                .await?;
            print_enrollment(&enrollment);
            Ok(())
        }
        Commands::History(args) => run_history(&client, args).await,
        Commands::Transition(args) => run_transition(&client, args).await,
        Commands::Approve(args) => run_action(&client, "approve", args).await,
        Commands::Reject(args) => run_action(&client, "reject", args).await,
        Commands::Withdraw(args) => run_action(&client, "withdraw", args).await,
        Commands::Drop(args) => run_action(&client, "drop", args).await,
        Commands::ApproveAll(args) => run_approve_all(&client, args).await,
        Commands::Record(args) => {
            let record: AcademicRecord = client
                .send(client.request(
                    Method::GET,
                    &format!("/api/students/{}/record", args.student),
                )?)
                .await?;
            print_record(&record);
            Ok(())
        }
    }
}
