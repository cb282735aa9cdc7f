use std::future::Future;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use super::error::EngineError;
use super::request::{LayoutRequest, LayoutResponse};

/// A layered-graph layout service.
///
/// One call lays out one request. Engines are stateful and not re-entrant:
/// `&mut self` keeps a second call from starting while a previous future is
/// still alive. Callers that want a timeout wrap the returned future and drop
/// it on expiry; any work the engine already started is abandoned.
pub trait LayoutEngine {
    fn layout(
        &mut self,
        request: LayoutRequest,
    ) -> impl Future<Output = Result<LayoutResponse, EngineError>>;
}

/// Runs an external program that reads an ELK JSON graph on stdin and
/// writes the laid-out ELK graph on stdout, for example a small elkjs
/// wrapper script run with node.
///
/// The returned future does the process I/O inline: polling it blocks the
/// calling thread until the program exits. Under an async runtime, drive it
/// from a blocking task (e.g. `tokio::task::spawn_blocking`).
#[derive(Debug, Clone)]
pub struct ElkProcessEngine {
    program: String,
    args: Vec<String>,
}

impl ElkProcessEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn run(&self, request: &LayoutRequest) -> Result<LayoutResponse, EngineError> {
        let payload = serde_json::to_vec(&request.to_elk_json())?;
        tracing::debug!(program = %self.program, bytes = payload.len(), "spawning layout engine");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Stdin is fed from its own thread while stdout and stderr drain.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload)?;
            }
            Ok(())
        });
        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));

        if !output.status.success() {
            return Err(EngineError::Exited {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if let Err(err) = written {
            tracing::debug!(program = %self.program, error = %err, "layout engine stopped reading its input");
            return Err(err.into());
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(LayoutResponse::from_elk_json(value)?)
    }
}

impl LayoutEngine for ElkProcessEngine {
    fn layout(
        &mut self,
        request: LayoutRequest,
    ) -> impl Future<Output = Result<LayoutResponse, EngineError>> {
        async move { self.run(&request) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use crate::ir::PortSide;
    use crate::layout::request::{
        PortConstraints, RequestEdge, RequestLabel, RequestNode, RequestPort,
    };

    fn empty_request() -> LayoutRequest {
        LayoutRequest {
            id: "root".to_string(),
            options: EngineOptions::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    fn chain_request(count: usize) -> LayoutRequest {
        let nodes = (0..count)
            .map(|i| RequestNode {
                id: format!("N{i}"),
                width: 220.0,
                height: 96.0,
                ports: vec![
                    RequestPort {
                        id: format!("N{i}.W0"),
                        side: PortSide::Inbound,
                    },
                    RequestPort {
                        id: format!("N{i}.E0"),
                        side: PortSide::Outbound,
                    },
                ],
                port_constraints: PortConstraints::FixedSide,
            })
            .collect();
        let edges = (1..count)
            .map(|i| RequestEdge {
                id: format!("N{}-N{i}-next", i - 1),
                source: format!("N{}.E0", i - 1),
                target: format!("N{i}.W0"),
                label: Some(RequestLabel {
                    id: format!("N{}-N{i}-next.label", i - 1),
                    text: "next".to_string(),
                    width: 40.0,
                    height: 20.0,
                }),
            })
            .collect();
        LayoutRequest {
            id: "root".to_string(),
            options: EngineOptions::default(),
            nodes,
            edges,
        }
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let mut engine = ElkProcessEngine::new("crmviz-no-such-layout-engine");
        let result = futures::executor::block_on(engine.layout(empty_request()));
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn reads_result_from_stdout() {
        let mut engine = ElkProcessEngine::new("sh").with_args([
            "-c",
            r#"cat >/dev/null; printf '{"id":"root","width":10,"height":20,"children":[{"id":"A","x":1,"y":2,"width":3,"height":4}]}'"#,
        ]);
        let response = futures::executor::block_on(engine.layout(empty_request())).unwrap();
        assert_eq!(response.width, 10.0);
        assert_eq!(response.nodes[0].id, "A");
        assert_eq!(response.nodes[0].y, 2.0);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_error() {
        let mut engine =
            ElkProcessEngine::new("sh").with_args(["-c", "cat >/dev/null; echo boom >&2; exit 3"]);
        let result = futures::executor::block_on(engine.layout(empty_request()));
        match result {
            Err(EngineError::Exited { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_reports_stderr_not_a_broken_pipe() {
        let mut engine = ElkProcessEngine::new("sh").with_args(["-c", "echo refused >&2; exit 2"]);
        let result = futures::executor::block_on(engine.layout(chain_request(2000)));
        match result {
            Err(EngineError::Exited { stderr, .. }) => assert_eq!(stderr, "refused"),
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn large_requests_stream_through_an_echoing_program() {
        // `cat` writes while it reads, so output fills the pipe before all
        // input has been written.
        let mut engine = ElkProcessEngine::new("cat");
        let response = futures::executor::block_on(engine.layout(chain_request(2000))).unwrap();
        assert_eq!(response.nodes.len(), 2000);
        assert_eq!(response.nodes[1999].id, "N1999");
    }

    #[cfg(unix)]
    #[test]
    fn garbage_output_is_an_error() {
        let mut engine = ElkProcessEngine::new("sh").with_args(["-c", "cat >/dev/null; echo nope"]);
        let result = futures::executor::block_on(engine.layout(empty_request()));
        assert!(matches!(result, Err(EngineError::Response(_))));
    }
}
