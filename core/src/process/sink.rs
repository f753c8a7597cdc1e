use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    fs::File,
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::oneshot,
    task::JoinHandle,
};

/// Byte ceiling applied to every captured stream.
pub const DEFAULT_LOG_CAP: u64 = 1_000_000;

/// A writer that accepts at most `cap` bytes and silently drops the rest.
///
/// Writes past the ceiling report success so that whatever feeds the sink
/// (typically a pipe from a child process) keeps draining instead of
/// blocking the child.
#[derive(Debug)]
pub struct BoundedLogSink<W> {
    inner: W,
    cap: u64,
    written: u64,
    dropped: u64,
}

impl<W> BoundedLogSink<W> {
    pub fn new(inner: W, cap: u64) -> Self {
        Self {
            inner,
            cap,
            written: 0,
            dropped: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Number of bytes discarded because the ceiling was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for BoundedLogSink<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let remaining = this.cap.saturating_sub(this.written);
        if remaining == 0 {
            this.dropped += buf.len() as u64;
            return Poll::Ready(Ok(buf.len()));
        }
        let n = remaining.min(buf.len() as u64) as usize;
        match Pin::new(&mut this.inner).poll_write(cx, &buf[..n]) {
            Poll::Ready(Ok(written)) => {
                this.written += written as u64;
                Poll::Ready(Ok(written))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl BoundedLogSink<File> {
    pub async fn create(path: impl AsRef<Path>, cap: u64) -> io::Result<Self> {
        let file = File::create(path).await?;
        Ok(Self::new(file, cap))
    }

    /// Flushes, truncates the file to the ceiling if it overran, and syncs it
    /// to stable storage. Returns the final on-disk size.
    pub async fn close(mut self) -> io::Result<u64> {
        self.inner.flush().await?;
        let mut len = self.inner.metadata().await?.len();
        if len > self.cap {
            self.inner.set_len(self.cap).await?;
            len = self.cap;
        }
        self.inner.sync_all().await?;
        Ok(len)
    }
}

/// Background task copying one child stream into a [`BoundedLogSink`].
#[derive(Debug)]
pub(crate) struct LogPump {
    path: PathBuf,
    task: JoinHandle<BoundedLogSink<File>>,
    stop: Option<oneshot::Sender<()>>,
}

impl LogPump {
    pub fn start<R>(mut src: R, mut sink: BoundedLogSink<File>, path: PathBuf) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            tokio::select! {
                res = tokio::io::copy(&mut src, &mut sink) => {
                    if let Err(e) = res {
                        log::debug!("Log pump stopped on error: {}", e);
                    }
                }
                _ = stop_rx => {}
            }
            sink
        });
        Self {
            path,
            task,
            stop: Some(stop_tx),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lets the pump drain for at most `grace`, then stops it and closes the sink.
    ///
    /// The pipe may stay open past the leader's exit when a grandchild
    /// inherited it, hence the bounded drain.
    pub async fn close(mut self, grace: Duration) -> io::Result<u64> {
        let mut task = self.task;
        let joined = match tokio::time::timeout(grace, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                if let Some(stop) = self.stop.take() {
                    let _ = stop.send(());
                }
                task.await
            }
        };
        let sink = joined.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        sink.close().await
    }
}
