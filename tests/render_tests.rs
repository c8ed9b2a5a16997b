use nfweb::{dispatch_methods, Args, Config, Context, Dispatch, Dispatcher, Model, RenderKind};
use serde::Serialize;

mod common;
use common::{get, post_form};

#[derive(Args, Debug, Default)]
#[args(form)]
pub struct Greet {
    #[form("name")]
    #[validate("nonzero")]
    pub name: String,
}

#[derive(Serialize)]
struct Greeting {
    name: String,
}

#[derive(Dispatcher, Default)]
pub struct Site {
    #[route(url = "/greet", view = "greet.html")]
    greet: Greet,
    #[route(url = "/old")]
    old: (),
    #[route(url = "/status")]
    status: (),
}

impl Dispatch for Site {}

#[dispatch_methods]
impl Site {
    fn greet_handler(&self, args: &mut Greet, ctx: &mut Context) {
        ctx.mvc.model = Model::record(Greeting {
            name: std::mem::take(&mut args.name),
        });
    }

    fn old_handler(&self, ctx: &mut Context) {
        ctx.mvc.render = RenderKind::Redirect;
        ctx.mvc.model = Model::from("/greet");
        ctx.mvc.status = 301;
    }

    fn status_handler(&self, ctx: &mut Context) {
        ctx.mvc.render = RenderKind::Status;
        ctx.mvc.status = 204;
    }
}

fn app(dir: &std::path::Path) -> nfweb::App {
    let config = Config {
        template_dir: Some(dir.to_path_buf()),
        ..Config::default()
    };
    let mut app = nfweb::App::new(&config);
    app.register(Site::default()).unwrap();
    app
}

#[test]
fn test_html_view_with_model_and_errors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("greet.html"),
        "{% for e in errors %}[{{ e.field }}: {{ e.error }}]{% endfor %}Hello {{ name }}!",
    )
    .unwrap();
    let app = app(dir.path());

    let res = post_form(&app, "/greet", "name=Ada");
    assert_eq!(res.status, 200);
    assert!(res.header("Content-Type").unwrap().starts_with("text/html"));
    assert_eq!(res.body_text(), "Hello Ada!");

    let res = post_form(&app, "/greet", "");
    assert_eq!(res.status, 200);
    assert_eq!(res.body_text(), "[name: zero value]Hello !");
}

#[test]
fn test_redirect_and_status_renders() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let res = get(&app, "/old");
    assert_eq!(res.status, 301);
    assert_eq!(res.header("Location"), Some("/greet"));

    let res = get(&app, "/status");
    assert_eq!(res.status, 204);
    assert!(res.body.is_empty());
}
