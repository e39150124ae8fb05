use anyhow::Result;
use ntest::timeout;
use pretty_assertions::assert_eq;
use yad::{Command, Error, Inferior, Signal, State, StopReason};

mod support;
use support::*;

#[test]
#[timeout(2000)]
fn test_launch_untraced() -> Result<()> {
    let inferior = Command::new(vec!["sleep", "60"])?.trace(false).spawn()?;
    let pid = inferior.pid();

    assert!(process_exists(pid));
    assert!(inferior.owns_lifetime());
    assert!(!inferior.is_traced());
    assert_eq!(inferior.state(), State::Running);
    assert_eq!(inferior.last_stop(), None);
    assert_eq!(tracer_pid(pid)?, 0);

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_untraced_exit() -> Result<()> {
    let mut inferior = Inferior::launch("/bin/true", false)?;

    let reason = inferior.wait_for_stop()?;

    assert_eq!(reason, StopReason::Exited(0));
    assert_eq!(inferior.state(), State::Exited);
    assert_eq!(inferior.last_stop(), Some(StopReason::Exited(0)));

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_exit_code() -> Result<()> {
    let mut inferior = Command::new(vec!["sh", "-c", "exit 200"])?.trace(false).spawn()?;

    assert_eq!(inferior.wait_for_stop()?, StopReason::Exited(200));

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_traced_stops_after_exec() -> Result<()> {
    let inferior = Command::new(vec!["sleep", "60"])?.spawn()?;
    let pid = inferior.pid();

    assert!(inferior.is_traced());
    assert_eq!(inferior.state(), State::Stopped);
    assert_eq!(inferior.last_stop(), Some(StopReason::Stopped(Signal::SIGTRAP as i32)));
    assert_eq!(process_status(pid)?, 't');
    assert_eq!(tracer_pid(pid)?, std::process::id() as i32);

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_path_lookup() -> Result<()> {
    let mut inferior = Inferior::launch("true", true)?;

    assert_eq!(inferior.state(), State::Stopped);

    inferior.resume()?;
    assert_eq!(inferior.wait_for_stop()?, StopReason::Exited(0));

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_no_such_program() -> Result<()> {
    for trace in [true, false] {
        let err = Inferior::launch("you_do_not_have_to_be_good", trace).unwrap_err();

        assert!(matches!(err, Error::Launch(_)));
        assert_eq!(err.to_string(), "exec failed: No such file or directory");
    }

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_not_executable() -> Result<()> {
    let err = Inferior::launch("/dev/null", true).unwrap_err();

    assert_eq!(err.to_string(), "exec failed: Permission denied");

    Ok(())
}

#[test]
#[timeout(2000)]
fn test_launch_interior_nul() -> Result<()> {
    let err = Inferior::launch("tr\0ue", false).unwrap_err();

    assert!(matches!(err, Error::Launch(_)));

    Ok(())
}
