use std::{
    fs::File,
    io::{self, Read, Write},
    process::ExitCode,
    sync::Arc,
};

use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info, span, Level};

use bucketfs::{
    adapters::{gcs::GcsClient, memory::MemoryClient, ObjectClient},
    filesystem::Filesystem,
    fs::ObjectFS,
    model::fs::{FsError, ListingEntry, WriteConfig},
    util::object::{parse_bucket_from_uri, parse_provider_from_uri, Provider},
};

fn cli() -> Command {
    let path = || Arg::new("PATH").required(true);
    let new_path = || Arg::new("NEW_PATH").required(true);

    Command::new("bucketfs")
        .about("Filesystem operations against an object storage bucket")
        .arg(
            Arg::new("BUCKET_URI")
                .help("s3://bucket, gs://bucket or mem://bucket")
                .required(true)
                .index(1),
        )
        .arg(Arg::new("prefix").long("prefix").default_value(""))
        .subcommand_required(true)
        .subcommand(
            Command::new("write")
                .arg(path())
                .arg(Arg::new("FILE").help("reads stdin when omitted"))
                .arg(Arg::new("mimetype").long("mimetype")),
        )
        .subcommand(Command::new("read").arg(path()))
        .subcommand(Command::new("delete").arg(path()))
        .subcommand(Command::new("copy").arg(path()).arg(new_path()))
        .subcommand(Command::new("rename").arg(path()).arg(new_path()))
        .subcommand(Command::new("mkdir").arg(Arg::new("DIRNAME").required(true)))
        .subcommand(Command::new("has").arg(path()))
        .subcommand(
            Command::new("ls")
                .arg(Arg::new("DIRECTORY").default_value(""))
                .arg(
                    Arg::new("recursive")
                        .short('r')
                        .long("recursive")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("stat").arg(path()))
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, FsError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| FsError::Config(format!("missing argument: {}", name)))
}

fn connect(
    runtime: &tokio::runtime::Runtime,
    provider: Provider,
) -> Result<Arc<dyn ObjectClient>, FsError> {
    let client: Arc<dyn ObjectClient> = match provider {
        Provider::AWS => {
            let config = runtime.block_on(aws_config::load_from_env());
            Arc::new(aws_sdk_s3::Client::new(&config))
        }
        Provider::GCS => {
            let config = runtime
                .block_on(google_cloud_storage::client::ClientConfig::default().with_auth())
                .map_err(|err| FsError::Config(format!("failed to load gcs auth: {}", err)))?;
            let project = config
                .project_id
                .clone()
                .ok_or_else(|| FsError::Config("missing gcs project id".to_string()))?;
            Arc::new(GcsClient::new(
                google_cloud_storage::client::Client::new(config),
                &project,
            ))
        }
        Provider::Memory => Arc::new(MemoryClient::new()),
    };

    Ok(client)
}

fn print_entry(entry: &ListingEntry) {
    match entry {
        ListingEntry::File {
            path,
            timestamp,
            size,
        } => println!("file\t{}\t{}\t{}", size, timestamp, path),
        ListingEntry::Dir { path } => println!("dir\t-\t-\t{}", path),
    }
}

fn run(fs: &ObjectFS, matches: &ArgMatches) -> Result<(), FsError> {
    match matches.subcommand() {
        Some(("write", sub)) => {
            let path = arg(sub, "PATH")?;
            let stream: Box<dyn Read + Send> = match sub.get_one::<String>("FILE") {
                Some(file) => Box::new(File::open(file)?),
                None => Box::new(io::stdin()),
            };
            let config = WriteConfig {
                mimetype: sub.get_one::<String>("mimetype").cloned(),
            };

            fs.write_stream(path, stream, &config)
        }
        Some(("read", sub)) => {
            let mut result = fs.read_stream(arg(sub, "PATH")?)?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut result.stream, &mut stdout)?;
            stdout.flush()?;
            Ok(())
        }
        Some(("delete", sub)) => fs.delete(arg(sub, "PATH")?),
        Some(("copy", sub)) => fs.copy(arg(sub, "PATH")?, arg(sub, "NEW_PATH")?),
        Some(("rename", sub)) => fs.rename(arg(sub, "PATH")?, arg(sub, "NEW_PATH")?),
        Some(("mkdir", sub)) => fs.create_dir(arg(sub, "DIRNAME")?, &WriteConfig::default()),
        Some(("has", sub)) => {
            println!("{}", fs.has(arg(sub, "PATH")?)?);
            Ok(())
        }
        Some(("ls", sub)) => {
            let entries = fs.list_contents(arg(sub, "DIRECTORY")?, sub.get_flag("recursive"))?;
            entries.iter().for_each(print_entry);
            Ok(())
        }
        Some(("stat", sub)) => {
            let path = arg(sub, "PATH")?;
            let metadata = fs.get_metadata(path)?;
            for (name, value) in &metadata.headers {
                println!("{}: {}", name, value);
            }
            println!("timestamp: {}", fs.get_timestamp(path)?.timestamp);
            Ok(())
        }
        Some((other, _)) => Err(FsError::Config(format!("unknown command: {}", other))),
        None => Err(FsError::Config("missing command".to_string())),
    }
}

fn execute(runtime: &tokio::runtime::Runtime, matches: &ArgMatches) -> Result<(), FsError> {
    let bucket_uri = arg(matches, "BUCKET_URI")?;
    let prefix = arg(matches, "prefix")?;
    let provider = parse_provider_from_uri(bucket_uri)?;
    let bucket = parse_bucket_from_uri(bucket_uri);
    info!(bucket = bucket, prefix = prefix, provider = ?provider, "args");

    let client = connect(runtime, provider)?;

    // SDK futures are polled synchronously and need the reactor of this runtime
    let _guard = runtime.enter();
    let fs = ObjectFS::new(client, bucket, prefix)?;

    run(&fs, matches)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().json().with_writer(io::stderr).init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    let matches = cli().get_matches();

    let runtime = match tokio::runtime::Runtime::new() {
        Err(err) => {
            error!(error_message=%err, error_group="runtime");
            return ExitCode::FAILURE;
        }
        Ok(rt) => rt,
    };

    let result = execute(&runtime, &matches);

    match result {
        Err(err) => {
            error!(error_message=%err, error_group="command");
            eprintln!("bucketfs: {}", err);
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        cli().debug_assert();
    }

    #[test]
    fn test_run_against_memory() {
        let client = Arc::new(MemoryClient::new());
        let fs = ObjectFS::new(client, "dummy-bucket", "").unwrap();

        let cases = vec![
            vec!["bucketfs", "mem://dummy-bucket", "mkdir", "images"],
            vec!["bucketfs", "mem://dummy-bucket", "ls", "-r"],
            vec!["bucketfs", "mem://dummy-bucket", "has", "images/"],
            vec!["bucketfs", "mem://dummy-bucket", "delete", "images/"],
        ];

        for args in cases {
            let matches = cli().try_get_matches_from(&args).unwrap();
            assert!(run(&fs, &matches).is_ok(), "failed for case: {:?}", args);
        }

        let matches = cli()
            .try_get_matches_from(["bucketfs", "mem://dummy-bucket", "stat", "missing"])
            .unwrap();
        assert!(run(&fs, &matches).is_err());
    }
}
