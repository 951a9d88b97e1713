use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "taskcp-agent",
    version,
    about = "One-shot TCP transfer agent - started by `taskcp` inside the remote container",
    long_about = "`taskcp-agent` listens on PORT, accepts a single connection and pumps stdin to the peer and the peer to stdout until the peer disconnects.

It is bootstrapped automatically by `taskcp` and should not typically be invoked manually."
)]
struct Args {
    /// TCP port to listen on
    port: u16,
}

fn main() {
    let args = Args::parse();
    let code = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => match runtime.block_on(agent::run(
            args.port,
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )) {
            Ok(stats) => {
                eprintln!(
                    "taskcp-agent: done, sent {} bytes, received {} bytes",
                    stats.sent, stats.received
                );
                0
            }
            Err(error) => {
                eprintln!("taskcp-agent: {error:#}");
                1
            }
        },
        Err(error) => {
            eprintln!("taskcp-agent: failed to start runtime: {error}");
            1
        }
    };
    // stdin may still be parked on a blocking read of the session terminal, exit without
    // waiting for it
    std::process::exit(code);
}
