#![cfg(unix)]

use std::time::Duration;

use devdesk_core::{BoxStream, CommandSpec, Error, Process, ProcessManager, UnixProcessManager};
use futures::StreamExt;

fn fixture(name: &str) -> CommandSpec {
    CommandSpec {
        name: name.to_owned(),
        cmd: vec!["bash".to_owned(), format!("./{name}.sh")],
        cwd: Some("./tests/fixtures/".parse().unwrap()),
        env: vec![],
    }
}

async fn collect(mut stream: BoxStream<Vec<u8>>) -> String {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&String::from_utf8_lossy(&chunk));
    }
    out
}

/// Read until `marker` shows up, so the script has installed its traps.
async fn wait_for_line(stream: &mut BoxStream<Vec<u8>>, marker: &str) {
    let mut seen = String::new();
    while !seen.contains(marker) {
        let chunk = stream.next().await.expect("stream closed before marker");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
}

#[tokio::test]
async fn test_process_manager_stdout() {
    let pm = UnixProcessManager::new();
    let out = pm.spawn(fixture("stdout")).await.unwrap();

    assert_eq!(
        collect(out.stdout).await,
        "INFO: line 1\nINFO: line 2\nINFO: stdout.sh finished\n"
    );
    assert_eq!(collect(out.stderr).await, "");
}

#[tokio::test]
async fn test_process_manager_stderr() {
    let pm = UnixProcessManager::new();
    let out = pm.spawn(fixture("stderr")).await.unwrap();

    assert_eq!(collect(out.stdout).await, "");
    assert_eq!(
        collect(out.stderr).await,
        "ERROR: line 1\nERROR: line 2\nERROR: stderr.sh finished\n"
    );
}

#[tokio::test]
async fn test_process_manager_both() {
    let pm = UnixProcessManager::new();
    let out = pm.spawn(fixture("both")).await.unwrap();

    let (stdout, stderr) = tokio::join!(collect(out.stdout), collect(out.stderr));
    assert_eq!(
        stdout,
        "STDOUT: message 2\nSTDOUT: message 4\nSTDOUT: message 6\nSTDOUT: message 8\nboth.sh done\n"
    );
    assert_eq!(
        stderr,
        "STDERR: message 1\nSTDERR: message 3\nSTDERR: message 5\nSTDERR: message 7\n"
    );
}

#[tokio::test]
async fn test_process_manager_env_and_cwd() {
    let pm = UnixProcessManager::new();
    let out = pm
        .spawn(CommandSpec {
            env: vec![("GREETING".to_owned(), "hello".to_owned())],
            ..fixture("env_cwd")
        })
        .await
        .unwrap();

    assert_eq!(collect(out.stdout).await, "GREETING=hello\nfixtures\n");
}

#[tokio::test]
async fn test_process_manager_exit_is_observed() {
    let pm = UnixProcessManager::new();
    let out = pm.spawn(fixture("stdout")).await.unwrap();
    let mut process = out.process;
    assert!(process.pid().is_some());

    collect(out.stdout).await;
    assert_eq!(process.wait(Duration::from_secs(5)).await.unwrap(), Some(0));
    assert!(!process.is_alive());
}

#[tokio::test]
async fn test_process_manager_sigterm() {
    let pm = UnixProcessManager::new();
    let mut out = pm.spawn(fixture("sigterm_exits")).await.unwrap();
    wait_for_line(&mut out.stdout, "ready").await;
    let mut process = out.process;
    assert!(process.is_alive());

    process.shutdown().await.unwrap();
    let result = process.wait(Duration::from_secs(2)).await.unwrap();
    assert_eq!(result, Some(0));
}

#[tokio::test]
async fn test_process_manager_sigkill() {
    let pm = UnixProcessManager::new();
    let mut out = pm.spawn(fixture("sigterm_ignored")).await.unwrap();
    wait_for_line(&mut out.stdout, "ready").await;
    let mut process = out.process;

    process.shutdown().await.unwrap();
    let result = process.wait(Duration::from_millis(300)).await.unwrap();
    assert_eq!(result, None);

    process.kill().await.unwrap();
    let result = process.wait(Duration::from_secs(2)).await.unwrap();
    assert_eq!(result, Some(137));
}

#[tokio::test]
async fn test_process_manager_terminate_escalates() {
    let pm = UnixProcessManager::new();
    let mut out = pm.spawn(fixture("sigterm_ignored")).await.unwrap();
    wait_for_line(&mut out.stdout, "ready").await;
    let mut process = out.process;

    let code = process.terminate(Duration::from_millis(200)).await.unwrap();
    assert_eq!(code, 137);
    assert!(!process.is_alive());
}

#[tokio::test]
async fn test_process_manager_launch_failure() {
    let pm = UnixProcessManager::new();

    let err = pm
        .spawn(CommandSpec {
            name: "missing".to_owned(),
            cmd: vec!["devdesk-definitely-not-a-binary".to_owned()],
            cwd: None,
            env: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Launch { ref service, .. } if service == "missing"));

    let err = pm
        .spawn(CommandSpec {
            name: "empty".to_owned(),
            cmd: vec![],
            cwd: None,
            env: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Launch { .. }));
}

/// Whether `pid` is gone or only a zombie.
#[cfg(target_os = "linux")]
fn is_dead(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat")).map_or(true, |stat| {
        stat.rsplit_once(") ")
            .is_some_and(|(_, rest)| rest.starts_with('Z'))
    })
}

#[tokio::test]
#[cfg(target_os = "linux")]
async fn test_process_manager_terminate_kills_leftover_group() {
    let pm = UnixProcessManager::new();
    let mut out = pm.spawn(fixture("leaves_child")).await.unwrap();

    let mut seen = String::new();
    while !seen.ends_with('\n') {
        let chunk = out.stdout.next().await.expect("no child pid printed");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    let child: u32 = seen.trim().strip_prefix("child ").unwrap().parse().unwrap();

    let mut process = out.process;
    assert_eq!(process.wait(Duration::from_secs(5)).await.unwrap(), Some(0));
    assert!(!is_dead(child));

    assert_eq!(process.terminate(Duration::from_millis(200)).await.unwrap(), 0);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !is_dead(child) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(is_dead(child));
}

