use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nfweb::logging::{init_logging, LogConfig};
use nfweb::{dispatch_methods, Args, Config, Context, Dispatch, Dispatcher, Model};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Echo service built on nfweb
#[derive(Parser)]
#[command(name = "echo_service")]
#[command(about = "nfweb demo: echo JSON, form, XML and query arguments", long_about = None)]
struct Cli {
    /// YAML configuration file; NF_* environment variables override it
    #[arg(short, long, env = "NF_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Listen address, overriding the configuration
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the route table and exit
    Routes,
}

#[derive(Args, Debug, Default, Deserialize, Serialize)]
#[args(json)]
pub struct PostJson {
    #[validate("len=5")]
    pub a: String,
    #[validate("min=2,max=6")]
    pub b: i64,
}

#[derive(Args, Debug, Default)]
#[args(form)]
pub struct PostForm {
    #[form("a")]
    #[validate("nonzero")]
    pub a: String,
}

#[derive(Args, Debug, Default, Deserialize, Serialize)]
#[args(xml, field = "file")]
#[serde(rename = "xml")]
pub struct PostXml {
    pub a: String,
    pub b: i64,
}

#[derive(Args, Debug, Default, Serialize)]
#[args(url)]
pub struct Search {
    pub a: String,
    pub dd: i64,
}

#[derive(Args, Debug, Default)]
#[args(url)]
pub struct UserId;

#[derive(Serialize)]
struct UserView {
    id: String,
}

#[derive(Dispatcher, Default)]
pub struct Users {
    #[route(url = "/{id}")]
    show: UserId,
}

impl Dispatch for Users {}

#[dispatch_methods]
impl Users {
    fn show_handler(&self, _args: &mut UserId, ctx: &mut Context) {
        let id = ctx.param("id").unwrap_or_default().to_string();
        ctx.json(200, &UserView { id });
    }
}

/// Versioned API: every URL below it is prefixed with `/v1`.
#[derive(Dispatcher, Default)]
pub struct V1 {
    #[route(url = "/users")]
    users: Users,
}

impl Dispatch for V1 {
    fn filter_url(&self, url: &str) -> String {
        format!("/v1{url}")
    }
}

#[dispatch_methods]
impl V1 {}

#[derive(Dispatcher, Default)]
pub struct Api {
    #[route(url = "/post/json", before = "trace_request")]
    post_json: PostJson,
    #[route(url = "/form")]
    form: PostForm,
    #[route(url = "/xml")]
    xml: PostXml,
    #[route(url = "/search", method = "GET")]
    search: Search,
    #[route(url = "/health")]
    health: (),
    #[route(url = "")]
    v1: V1,
}

impl Dispatch for Api {}

#[dispatch_methods]
impl Api {
    fn trace_request(&self, ctx: &mut Context) {
        info!(request_id = %ctx.request_id(), path = %ctx.request.path, "Echo request");
    }

    fn post_json_handler(&self, args: &mut PostJson, ctx: &mut Context) {
        args.a.push_str("54321");
        args.b += 10;
        ctx.mvc.model = Model::record(std::mem::take(args));
    }

    fn form_handler(&self, args: &mut PostForm, ctx: &mut Context) {
        if let Some(errors) = &ctx.mvc.errors {
            let body = format!("invalid form: {errors}");
            ctx.text(400, body);
            return;
        }
        ctx.text(200, format!("a={}", args.a));
    }

    fn xml_handler(&self, args: &mut PostXml, ctx: &mut Context) {
        ctx.mvc.model = Model::record(std::mem::take(args));
    }

    fn search_handler(&self, args: &mut Search, ctx: &mut Context) {
        ctx.json(200, &*args);
    }

    fn health_handler(&self, ctx: &mut Context) {
        ctx.text(200, "ok");
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(p) => Config::from_yaml_file(p)?,
        None => Config::from_env()?,
    };
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&LogConfig::from_env())?;

    let mut config = load_config(cli.config.as_ref())?;
    let mut app = nfweb::App::new(&config);
    app.register(Api::default())?;

    match cli.command.unwrap_or(Commands::Serve { addr: None }) {
        Commands::Routes => {
            print!("{}", app.router().route_table());
        }
        Commands::Serve { addr } => {
            if let Some(addr) = addr {
                config.addr = addr;
            }
            let handle = app.serve(config.addr.as_str())?;
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("server worker panicked"))?;
        }
    }
    Ok(())
}
