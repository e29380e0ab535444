//! Thin command-line front end over the `pocketdock` library: one subcommand per
//! `ContainerHandle`/`discovery` operation, no argument-parsing dependency.

use std::{path::Path, time::Duration};

use futures_util::StreamExt;
use pocketdock::{
    container::LogsOptions,
    discovery,
    handle::{CreateOptions, ExecResult},
    tty::TtyChunk,
    Callbacks, ContainerHandle, Docker, Error,
};

const EXIT_OK: i32 = 0;
const EXIT_USER_ERROR: i32 = 1;
const EXIT_USAGE_ERROR: i32 = 2;
const EXIT_ENGINE_UNAVAILABLE: i32 = 3;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = run(args).await;
    std::process::exit(code);
}

async fn run(mut args: Vec<String>) -> i32 {
    if args.is_empty() {
        eprintln!("{}", USAGE);
        return EXIT_USAGE_ERROR;
    }
    let command = args.remove(0);

    match command.as_str() {
        "init" => cmd_init(&args),
        "profiles" => cmd_profiles(&args),
        "build" | "export" | "import" => {
            eprintln!(
                "`{}` manages project files and is not implemented by this binary; \
                 use the library directly or manage `.pocketdock/` by hand.",
                command
            );
            EXIT_USAGE_ERROR
        }
        "doctor" => cmd_doctor().await,
        other => {
            let docker = match connect().await {
                Ok(docker) => docker,
                Err(code) => return code,
            };
            match other {
                "create" => cmd_create(&docker, &args).await,
                "run" => cmd_run(&docker, &args).await,
                "push" => cmd_push(&docker, &args).await,
                "pull" => cmd_pull(&docker, &args).await,
                "info" => cmd_info(&docker, &args).await,
                "list" => cmd_list(&docker, &args).await,
                "reboot" => cmd_reboot(&docker, &args).await,
                "stop" => cmd_stop(&docker, &args).await,
                "resume" => cmd_resume(&docker, &args).await,
                "shutdown" => cmd_shutdown(&docker, &args).await,
                "snapshot" => cmd_snapshot(&docker, &args).await,
                "prune" => cmd_prune(&docker, &args).await,
                "shell" => cmd_shell(&docker, &args).await,
                "logs" => cmd_logs(&docker, &args).await,
                _ => {
                    eprintln!("unknown command: {}\n{}", other, USAGE);
                    EXIT_USAGE_ERROR
                }
            }
        }
    }
}

const USAGE: &str = "usage: pocketdock <create|run|push|pull|info|list|reboot|stop|resume|\
shutdown|snapshot|prune|shell|logs|doctor|build|export|import|init|profiles> [args..]";

async fn connect() -> Result<Docker, i32> {
    match Docker::auto().await {
        Ok(docker) => Ok(docker),
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            Err(EXIT_ENGINE_UNAVAILABLE)
        }
    }
}

fn engine_message(err: &Error) -> String {
    format!("error: {}", err)
}

fn exit_for(err: &Error) -> i32 {
    match err {
        Error::EngineUnavailable { .. } | Error::SocketConnection { .. } => EXIT_ENGINE_UNAVAILABLE,
        _ => EXIT_USER_ERROR,
    }
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn flag_values(args: &[String], name: &str) -> Vec<String> {
    args.iter()
        .zip(args.iter().skip(1))
        .filter(|(flag, _)| *flag == name)
        .map(|(_, value)| value.clone())
        .collect()
}

fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            // Flags that take a value consume the next token too; flags without one (booleans)
            // don't. We only need to skip values for flags this binary recognizes.
            if matches!(
                arg.as_str(),
                "--name" | "--env" | "--memory" | "--project" | "--profile" | "--data-path"
                    | "--lang" | "--timeout" | "--max-output" | "--grace" | "--image" | "--tail"
            ) {
                iter.next();
            }
        } else {
            out.push(arg.clone());
        }
    }
    out
}

async fn cmd_doctor() -> i32 {
    match Docker::auto().await {
        Ok(docker) => match docker.version().await {
            Ok(version) => {
                println!("engine reachable, api version {}", version.api_version);
                EXIT_OK
            }
            Err(err) => {
                eprintln!("{}", engine_message(&err));
                EXIT_ENGINE_UNAVAILABLE
            }
        },
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            EXIT_ENGINE_UNAVAILABLE
        }
    }
}

async fn cmd_create(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let image = match flag_value(args, "--image").or_else(|| positional(args).into_iter().next()) {
        Some(image) => image,
        None => {
            eprintln!("usage: pocketdock create --image <image> [--name N] [--env K=V]... \
                [--memory BYTES] [--cpus N] [--workdir DIR] [--volume HOST:CONTAINER]... \
                [--network MODE] [--persist] [--project P] [--profile P] [--data-path PATH]");
            return EXIT_USAGE_ERROR;
        }
    };

    let opts = CreateOptions {
        image,
        name: flag_value(args, "--name"),
        env: flag_values(args, "--env"),
        memory_bytes: flag_value(args, "--memory").and_then(|v| v.parse().ok()),
        nano_cpus: flag_value(args, "--cpus")
            .and_then(|v| v.parse::<f64>().ok())
            .map(|cpus| (cpus * 1_000_000_000.0) as u64),
        working_dir: flag_value(args, "--workdir"),
        binds: flag_values(args, "--volume"),
        network_mode: flag_value(args, "--network"),
        persist: has_flag(args, "--persist"),
        project: flag_value(args, "--project"),
        profile: flag_value(args, "--profile"),
        data_path: flag_value(args, "--data-path").map(std::path::PathBuf::from),
        ..CreateOptions::default()
    };

    match ContainerHandle::create(docker, opts).await {
        Ok(handle) => {
            println!("{}\t{}", handle.name(), handle.id());
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_run(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let positionals = positional(args);
    let (name, command) = match (positionals.first(), positionals.get(1..)) {
        (Some(name), Some(rest)) if !rest.is_empty() => (name.clone(), rest.join(" ")),
        _ => {
            eprintln!(
                "usage: pocketdock run <name> <command...> [--stream|--detach] [--lang L] \
                 [--timeout SECS] [--max-output BYTES]"
            );
            return EXIT_USAGE_ERROR;
        }
    };

    let mut handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };

    if let Some(max_output) = flag_value(args, "--max-output").and_then(|v| v.parse().ok()) {
        handle.set_max_output(max_output);
    }

    let lang = flag_value(args, "--lang");
    let timeout = flag_value(args, "--timeout")
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs);

    if has_flag(args, "--detach") {
        let process = match handle
            .run_detached(lang.as_deref(), &command, Callbacks::new())
            .await
        {
            Ok(process) => process,
            Err(err) => {
                eprintln!("{}", engine_message(&err));
                return exit_for(&err);
            }
        };
        println!("started");
        drop(process);
        return EXIT_OK;
    }

    if has_flag(args, "--stream") {
        let mut stream = match handle.run_streaming(lang.as_deref(), &command).await {
            Ok(stream) => stream,
            Err(err) => {
                eprintln!("{}", engine_message(&err));
                return exit_for(&err);
            }
        };
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => print_chunk(&chunk),
                Err(err) => {
                    eprintln!("{}", engine_message(&err));
                    return exit_for(&err);
                }
            }
        }
        match stream.result() {
            Some(result) => print_exit(result),
            None => EXIT_USER_ERROR,
        }
    } else {
        match handle.run_blocking(lang.as_deref(), &command, timeout).await {
            Ok(result) => {
                print!("{}", result.stdout);
                eprint!("{}", result.stderr);
                print_exit(&result)
            }
            Err(err) => {
                eprintln!("{}", engine_message(&err));
                exit_for(&err)
            }
        }
    }
}

fn print_chunk(chunk: &TtyChunk) {
    match chunk {
        TtyChunk::StdOut(bytes) => print!("{}", String::from_utf8_lossy(bytes)),
        TtyChunk::StdErr(bytes) => eprint!("{}", String::from_utf8_lossy(bytes)),
        TtyChunk::StdIn(_) => {}
    }
}

fn print_exit(result: &ExecResult) -> i32 {
    if result.timed_out {
        eprintln!("timed out");
    }
    if result.truncated {
        eprintln!("output truncated at the configured max-output cap");
    }
    if result.ok() {
        EXIT_OK
    } else {
        EXIT_USER_ERROR
    }
}

async fn cmd_push(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let positionals = positional(args);
    let (name, src, dst) = match (positionals.get(0), positionals.get(1), positionals.get(2)) {
        (Some(name), Some(src), Some(dst)) => (name.clone(), src.clone(), dst.clone()),
        _ => {
            eprintln!("usage: pocketdock push <name> <local-dir> <container-dir>");
            return EXIT_USAGE_ERROR;
        }
    };
    let handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    match handle.push(Path::new(&src), Path::new(&dst)).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_pull(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let positionals = positional(args);
    let (name, src, dst) = match (positionals.get(0), positionals.get(1), positionals.get(2)) {
        (Some(name), Some(src), Some(dst)) => (name.clone(), src.clone(), dst.clone()),
        _ => {
            eprintln!("usage: pocketdock pull <name> <container-dir> <local-dir>");
            return EXIT_USAGE_ERROR;
        }
    };
    let handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    match handle.pull(Path::new(&src), Path::new(&dst)).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_info(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock info <name> [--json]");
            return EXIT_USAGE_ERROR;
        }
    };
    let handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    match handle.info().await {
        Ok(info) => {
            if has_flag(args, "--json") {
                println!(
                    "{}",
                    serde_json::json!({
                        "id": info.id,
                        "status": info.status,
                        "image": info.image,
                        "memory_usage_bytes": info.memory_usage_bytes,
                        "memory_limit_bytes": info.memory_limit_bytes,
                        "memory_percent": info.memory_percent,
                        "cpu_percent": info.cpu_percent,
                        "network": {
                            "ip_address": info.network.ip_address,
                            "gateway": info.network.gateway,
                        },
                        "process_count": info.processes.processes.len(),
                    })
                );
            } else {
                println!("id:         {}", info.id);
                println!("status:     {}", info.status);
                println!("image:      {}", info.image);
                println!("memory:     {:?} / {:?} ({:?}%)", info.memory_usage_bytes, info.memory_limit_bytes, info.memory_percent);
                println!("cpu:        {:?}%", info.cpu_percent);
                println!("ip:         {}", info.network.ip_address);
                println!("processes:  {}", info.processes.processes.len());
            }
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_list(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let project = flag_value(args, "--project");
    match discovery::list(docker, project.as_deref()).await {
        Ok(containers) => {
            if has_flag(args, "--json") {
                let values: Vec<_> = containers
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "name": c.name,
                            "status": c.status,
                            "image": c.image,
                            "created_at": c.created_at,
                            "persist": c.persist,
                            "project": c.project,
                        })
                    })
                    .collect();
                println!("{}", serde_json::Value::Array(values));
            } else {
                for c in &containers {
                    println!(
                        "{}\t{}\t{}\t{}",
                        c.name,
                        c.status,
                        c.image,
                        c.project.as_deref().unwrap_or("-")
                    );
                }
            }
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_reboot(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock reboot <name> [--timeout SECS] [--fresh]");
            return EXIT_USAGE_ERROR;
        }
    };
    let timeout = flag_value(args, "--timeout")
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs);
    let fresh = has_flag(args, "--fresh");
    let mut handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    match handle.reboot(timeout, fresh).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_stop(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock stop <name> [--timeout SECS]");
            return EXIT_USAGE_ERROR;
        }
    };
    let timeout = flag_value(args, "--timeout")
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(10));

    let found = match discovery::list(docker, None).await {
        Ok(containers) => containers.into_iter().find(|c| c.name == name),
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    let found = match found {
        Some(found) => found,
        None => {
            eprintln!("container {} not found", name);
            return EXIT_USER_ERROR;
        }
    };
    match docker.containers().get(&found.id).stop(Some(timeout)).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_resume(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock resume <name>");
            return EXIT_USAGE_ERROR;
        }
    };
    match discovery::resume(docker, &name).await {
        Ok(handle) => {
            println!("{}\t{}", handle.name(), handle.id());
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_shutdown(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock shutdown <name> [--grace SECS]");
            return EXIT_USAGE_ERROR;
        }
    };
    let grace = flag_value(args, "--grace")
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(10));

    let handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    match handle.shutdown(grace).await {
        Ok(()) => EXIT_OK,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_snapshot(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let positionals = positional(args);
    let (name, image_name) = match (positionals.get(0), positionals.get(1)) {
        (Some(name), Some(image_name)) => (name.clone(), image_name.clone()),
        _ => {
            eprintln!("usage: pocketdock snapshot <name> <image-name>");
            return EXIT_USAGE_ERROR;
        }
    };
    let handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    match handle.snapshot(&image_name).await {
        Ok(id) => {
            println!("{}", id);
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_prune(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let project = flag_value(args, "--project");
    match discovery::prune(docker, project.as_deref()).await {
        Ok(removed) => {
            for name in removed {
                println!("{}", name);
            }
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            exit_for(&err)
        }
    }
}

async fn cmd_shell(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock shell <name>");
            return EXIT_USAGE_ERROR;
        }
    };
    let handle = match discovery::resume(docker, &name).await {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    let session = match handle.open_session().await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };

    loop {
        let line = match tokio::task::spawn_blocking(read_line).await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let trimmed = line.trim_end();
        if trimmed == "exit" {
            break;
        }
        match session.send_and_wait(trimmed, None).await {
            Ok(result) => print!("{}", result.stdout),
            Err(Error::SessionClosed) => break,
            Err(err) => eprintln!("{}", engine_message(&err)),
        }
    }

    let _ = session.close().await;
    EXIT_OK
}

fn read_line() -> Option<String> {
    use std::io::BufRead;
    let mut buf = String::new();
    match std::io::stdin().lock().read_line(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf),
        Err(_) => None,
    }
}

async fn cmd_logs(
    docker: &Docker,
    args: &[String],
) -> i32 {
    let name = match positional(args).into_iter().next() {
        Some(name) => name,
        None => {
            eprintln!("usage: pocketdock logs <name> [--tail N] [--follow]");
            return EXIT_USAGE_ERROR;
        }
    };
    let found = match discovery::list(docker, None).await {
        Ok(containers) => containers.into_iter().find(|c| c.name == name),
        Err(err) => {
            eprintln!("{}", engine_message(&err));
            return exit_for(&err);
        }
    };
    let found = match found {
        Some(found) => found,
        None => {
            eprintln!("container {} not found", name);
            return EXIT_USER_ERROR;
        }
    };

    let mut builder = LogsOptions::builder();
    builder.stdout(true).stderr(true);
    builder.follow(has_flag(args, "--follow"));
    if let Some(tail) = flag_value(args, "--tail") {
        builder.tail(&tail);
    }
    let opts = builder.build();

    let container = docker.containers().get(&found.id);
    let mut stream = Box::pin(container.logs(&opts));
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => print_chunk(&chunk),
            Err(err) => {
                eprintln!("{}", engine_message(&err));
                return exit_for(&err);
            }
        }
    }
    EXIT_OK
}

fn cmd_init(args: &[String]) -> i32 {
    let project_name = flag_value(args, "--project").unwrap_or_else(|| {
        std::env::current_dir()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "project".to_owned())
    });

    let dir = Path::new(".pocketdock");
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("error: {}", err);
        return EXIT_USER_ERROR;
    }

    let config = format!(
        "project_name: {}\n\
         default_profile: default\n\
         default_persist: false\n\
         auto_log: true\n\
         max_log_size: 10MiB\n\
         max_logs_per_instance: 5\n\
         retention_days: 7\n\
         socket: null\n\
         log_level: info\n",
        project_name
    );

    match std::fs::write(dir.join("config.yaml"), config) {
        Ok(()) => {
            println!("initialized project {} in .pocketdock/config.yaml", project_name);
            EXIT_OK
        }
        Err(err) => {
            eprintln!("error: {}", err);
            EXIT_USER_ERROR
        }
    }
}

/// Recognized keys are flat `key: value` scalars (spec.md's config format); this reads that
/// subset directly rather than pulling in a full YAML parser for one CLI command.
fn cmd_profiles(_args: &[String]) -> i32 {
    let path = Path::new(".pocketdock/config.yaml");
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => {
            eprintln!("{}", engine_message(&Error::ProjectNotInitialized));
            return EXIT_USER_ERROR;
        }
    };

    let default_profile = contents
        .lines()
        .find_map(|line| line.strip_prefix("default_profile:"))
        .map(str::trim)
        .unwrap_or("default");

    println!("{} (default)", default_profile);
    EXIT_OK
}
