use anyhow::Result;
use structopt::StructOpt;
use yad::{Command, Inferior, Pid, StopReason};

/// Launch or attach to an inferior, then continue it until it exits.
#[derive(StructOpt, Debug)]
struct Opt {
    /// Attach to a running process instead of launching one.
    #[structopt(short, long)]
    pid: Option<i32>,

    #[structopt(required_unless = "pid")]
    argv: Vec<String>,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut inferior = match opt.pid {
        Some(pid) => Inferior::attach(Pid::from_raw(pid))?,
        None => Command::new(opt.argv)?.spawn()?,
    };

    if let Some(reason) = inferior.last_stop() {
        print_stop_reason(&inferior, reason);
    }

    while !inferior.state().is_terminal() {
        inferior.resume()?;

        let reason = inferior.wait_for_stop()?;
        print_stop_reason(&inferior, reason);
    }

    Ok(())
}

fn print_stop_reason(inferior: &Inferior, reason: StopReason) {
    let signal = || {
        reason
            .signal()
            .map(|sig| sig.as_str().to_owned())
            .unwrap_or_else(|| reason.info().to_string())
    };

    match reason {
        StopReason::Exited(code) =>
            println!("Process {} exited with status {}", inferior.pid(), code),
        StopReason::Terminated(_) =>
            println!("Process {} terminated with signal {}", inferior.pid(), signal()),
        StopReason::Stopped(_) =>
            println!("Process {} stopped with signal {}", inferior.pid(), signal()),
    }
}
