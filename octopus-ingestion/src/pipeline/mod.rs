use std::{marker::PhantomData, pin::Pin};

use futures::{Stream, StreamExt};
use octopus_client::ApiError;

use crate::sinks::{Point, SinkError, WriteSession};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self { payload }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(#[from] ApiError),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

/// Maps one fetched record to the points written for it.
#[async_trait::async_trait]
pub trait Transform<T>: Send + Sync {
    async fn apply(&self, input: Envelope<T>) -> Result<Vec<Point>, PipelineError>;
}

/// Source → transform → write session, for one kind of record.
pub struct Pipeline<S, T, X> {
    pub name: &'static str,
    pub source: S,
    pub transform: X,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T, X> Pipeline<S, T, X>
where
    T: Send + 'static,
    S: Source<T>,
    X: Transform<T>,
{
    pub fn new(name: &'static str, source: S, transform: X) -> Self {
        Self {
            name,
            source,
            transform,
            _marker: PhantomData,
        }
    }

    /// Drive the source to completion, writing points as they are produced.
    ///
    /// A source error ends the run; a record the transform rejects is
    /// skipped. Returns the number of points handed to the session.
    pub async fn run(&self, session: &WriteSession) -> Result<usize, PipelineError> {
        let mut stream = self.source.stream().await;
        let mut written = 0;

        while let Some(item) = stream.next().await {
            let env = item?;
            match self.transform.apply(env).await {
                Ok(points) => {
                    for point in points {
                        session.write(point).await?;
                        written += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(pipeline = self.name, error = %e, "dropping record");
                }
            }
        }

        Ok(written)
    }
}
