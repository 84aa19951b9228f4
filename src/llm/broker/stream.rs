use super::accumulator::StreamAccumulator;
use super::{append_tool_round, new_correlation_id, LlmBroker};
use crate::error::Result;
use crate::llm::gateway::{CompletionConfig, FragmentStream};
use crate::llm::models::{LlmMessage, LlmToolCall};
use crate::llm::tools::{LlmTool, ToolOutcome};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::time::Instant;
use tracing::{debug, info, warn};

enum Level<'a> {
    /// The next model call has not been sent yet
    Pending,
    Streaming {
        fragments: FragmentStream<'a>,
        accumulator: StreamAccumulator,
        started: Instant,
    },
    Done,
}

/// Pull-driven state machine behind `LlmBroker::generate_stream`.
///
/// Each level is one streamed model call. Text deltas are handed out as they arrive;
/// when a level ends with tool calls, the tools run, the conversation grows, and the
/// next level starts on the following pull. Nothing happens between pulls, and
/// dropping the machine abandons the exchange.
pub(crate) struct BrokerStream<'a> {
    broker: &'a LlmBroker,
    tools: Option<&'a [Box<dyn LlmTool>]>,
    config: CompletionConfig,
    correlation_id: String,
    conversation: Vec<LlmMessage>,
    rounds: usize,
    level: Level<'a>,
}

impl<'a> BrokerStream<'a> {
    fn new(
        broker: &'a LlmBroker,
        conversation: Vec<LlmMessage>,
        tools: Option<&'a [Box<dyn LlmTool>]>,
        config: CompletionConfig,
        correlation_id: String,
    ) -> Self {
        Self {
            broker,
            tools,
            config,
            correlation_id,
            conversation,
            rounds: 0,
            level: Level::Pending,
        }
    }

    /// The next text chunk, an error that ends the stream, or `None` when finished
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        loop {
            match &mut self.level {
                Level::Done => return None,
                Level::Pending => self.level = self.open_level(),
                Level::Streaming {
                    fragments,
                    accumulator,
                    ..
                } => match fragments.next().await {
                    Some(Ok(fragment)) => {
                        if let Some(delta) = fragment.tool_call {
                            accumulator.merge(delta);
                        }
                        if let Some(text) = fragment.content.filter(|t| !t.is_empty()) {
                            accumulator.push_content(&text);
                            return Some(Ok(text));
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Stream failed: {}", e);
                        self.level = Level::Done;
                        return Some(Err(e));
                    }
                    None => {
                        if let Level::Streaming {
                            accumulator,
                            started,
                            ..
                        } = std::mem::replace(&mut self.level, Level::Done)
                        {
                            if let Err(e) = self.close_level(accumulator, started) {
                                return Some(Err(e));
                            }
                        }
                    }
                },
            }
        }
    }

    fn open_level(&self) -> Level<'a> {
        let broker = self.broker;
        debug!(round = self.rounds, "Opening stream level");
        broker.record_call(&self.conversation, self.tools, &self.config, &self.correlation_id);

        let fragments = broker.gateway.complete_stream(
            &broker.model,
            &self.conversation,
            self.tools,
            &self.config,
        );

        Level::Streaming {
            fragments,
            accumulator: StreamAccumulator::default(),
            started: Instant::now(),
        }
    }

    /// Record the finished level and, if tools were requested, run them and queue the
    /// next level. Leaves the machine `Done` otherwise.
    fn close_level(&mut self, accumulator: StreamAccumulator, started: Instant) -> Result<()> {
        let broker = self.broker;
        let content = accumulator.content();
        let finalized = accumulator.finish();
        let calls: Vec<LlmToolCall> = finalized.iter().map(|f| f.call.clone()).collect();

        broker.record_response(&content, &calls, started, &self.correlation_id);

        if finalized.is_empty() {
            return Ok(());
        }
        let Some(tools) = self.tools.filter(|t| !t.is_empty()) else {
            warn!("LLM requested tool calls but no tools provided");
            return Ok(());
        };

        self.rounds += 1;
        broker.check_round_limit(self.rounds)?;
        info!(round = self.rounds, "Processing {} tool call(s) in stream", finalized.len());

        let outcomes: Vec<ToolOutcome> = finalized
            .into_iter()
            .map(|f| match f.parse_error {
                Some(e) => {
                    warn!(tool = %f.call.name, "Skipping call with malformed arguments: {}", e);
                    ToolOutcome::from(e)
                }
                None => broker.execute_tool_call(&f.call, tools, &self.correlation_id),
            })
            .collect();
        let content = Some(content).filter(|c| !c.is_empty());
        append_tool_round(&mut self.conversation, content, calls, outcomes);

        self.level = Level::Pending;
        Ok(())
    }
}

impl LlmBroker {
    /// Generate streaming text response from LLM
    ///
    /// Yields text chunks in arrival order, across every tool round. Tool calls are
    /// reassembled from their fragments, executed once the model's turn is complete,
    /// and the follow-up response is streamed in the same sequence. A gateway failure
    /// is yielded as the final item.
    ///
    /// ```rust,ignore
    /// use futures::stream::StreamExt;
    ///
    /// let mut stream = broker.generate_stream(&messages, Some(&tools), None, None);
    /// while let Some(chunk) = stream.next().await {
    ///     print!("{}", chunk?);
    /// }
    /// ```
    pub fn generate_stream<'a>(
        &'a self,
        messages: &[LlmMessage],
        tools: Option<&'a [Box<dyn LlmTool>]>,
        config: Option<CompletionConfig>,
        correlation_id: Option<String>,
    ) -> Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>> {
        let machine = BrokerStream::new(
            self,
            messages.to_vec(),
            tools,
            config.unwrap_or_default(),
            correlation_id.unwrap_or_else(new_correlation_id),
        );

        Box::pin(stream::unfold(machine, |mut machine| async move {
            machine.next_chunk().await.map(|chunk| (chunk, machine))
        }))
    }
}
