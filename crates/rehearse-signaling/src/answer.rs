use rehearse_types::SessionDescription;

/// Receive-only audio answer returned by [`TemplateAnswer`].
pub const TEMPLATE_ANSWER_SDP: &str = "v=0\n\
o=- 0 0 IN IP4 127.0.0.1\n\
s=MAKA-SIGNALING\n\
t=0 0\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\n\
a=recvonly\n\
a=mid:0\n";

/// Produces the answer stored alongside a submitted offer.
pub trait AnswerSynthesizer: Send + Sync {
    fn answer(&self, session_id: &str, offer: &SessionDescription) -> SessionDescription;
}

/// Fixed-template answer, independent of the offer's media lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateAnswer;

impl AnswerSynthesizer for TemplateAnswer {
    fn answer(&self, _session_id: &str, _offer: &SessionDescription) -> SessionDescription {
        SessionDescription::answer(TEMPLATE_ANSWER_SDP)
    }
}
