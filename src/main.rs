use std::{env, io, io::BufRead};

use embedhttp::{logger, logger::micro::*, LinePool, Server, ServerConfig};

const PORT_ENV: &str = "EMBEDHTTP_PORT";
const DEFAULT_HTTP_PORT: u16 = 0;

fn main() {
    if let Err(e) = logger::init_stdout_logger(10, logger::Level::Info) {
        eprintln!("logger not installed: {}", e);
    }

    let port = get_http_port();
    let ncpu = num_cpus::get();
    info!("# of CPU: {}", ncpu);

    let mut s = Server::with_config(ServerConfig::from_env());
    let started = set_up_server_handlers(&mut s)
        .and_then(|s| s.set_executor(LinePool::new(ncpu * 2)))
        .and_then(|s| s.start_on_port(port));
    if let Err(e) = started {
        error!("failed to start: {}", e);
        std::process::exit(1);
    }
    match s.url("/get") {
        Ok(url) => println!("serving {} (press enter to stop)", url),
        Err(e) => error!("{}", e),
    }

    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
    s.stop();
}

fn get_http_port() -> u16 {
    match env::var(PORT_ENV) {
        Ok(port_str) => {
            match port_str.parse::<u16>() {
                Ok(port) => port,
                Err(e) => {
                    warn!("{}. using an ephemeral port", e);
                    DEFAULT_HTTP_PORT
                },
            }
        },
        Err(_) => DEFAULT_HTTP_PORT,
    }
}

fn set_up_server_handlers(server: &mut Server) -> Result<&mut Server, embedhttp::ServerError> {
    server
        .add_handler("/get", |req, res| {
            debug!("{:?}", req);
            res.set_body("Hello, World!")
                .add_header("content-type", "text/plain");
        })?
        .add_handler("/post", |req, res| {
            debug!("{:?} {:?}", req, req.first_header("content-type"));
            res.set_body(r#"{"message": "Roger that!"}"#)
                .add_header("content-type", "application/json");
        })
}
