//! Frame reassembly through pipe nodes under arbitrary chunking.

use bytes::{Bytes, BytesMut};
use callpipe_frame::{Call, CodecConfig, Decoded, FrameCodec, FrameError, Value, HEADER_SIZE};
use callpipe_pipe::{CallChannel, PipeNode};
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::UInt),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        ".{0,12}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(|raw| Value::Bytes(Bytes::from(raw))),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::vec(("[a-z]{0,6}", inner), 0..4).prop_map(Value::Map),
        ]
    })
}

fn arb_call() -> impl Strategy<Value = Call> {
    ("[a-z_]{1,12}", prop::collection::vec(arb_value(), 0..=8))
        .prop_map(|(name, args)| Call::with_args(name, args))
}

fn encode_all(calls: &[Call]) -> Bytes {
    let codec = FrameCodec::default();
    let mut wire = BytesMut::new();
    for call in calls {
        codec.encode_call(call, &mut wire).unwrap();
    }
    wire.freeze()
}

/// Feed `wire` to a fresh node in chunks of the given sizes (cycled),
/// draining after every chunk.
fn feed_chunked(wire: &Bytes, sizes: &[usize]) -> Vec<Call> {
    let channel = CallChannel::new(PipeNode::new());
    let mut decoded = Vec::new();
    let mut offset = 0usize;
    let mut sizes = sizes.iter().cycle();
    while offset < wire.len() {
        let size = sizes.next().copied().unwrap_or(1).max(1);
        let end = (offset + size).min(wire.len());
        channel.pipe().receive(wire.slice(offset..end), None);
        channel.drain(|call| decoded.push(call)).unwrap();
        offset = end;
    }
    assert_eq!(channel.pipe().buffered_len(), 0);
    decoded
}

proptest! {
    #[test]
    fn serialize_then_deserialize(call in arb_call()) {
        let codec = FrameCodec::default();
        let mut wire = BytesMut::from(&codec.serialize(call.name(), call.args()).unwrap()[..]);
        prop_assert_eq!(codec.deserialize(&mut wire).unwrap(), Decoded::Call(call));
        prop_assert!(wire.is_empty());
    }

    #[test]
    fn chunk_boundaries_do_not_matter(
        calls in prop::collection::vec(arb_call(), 1..6),
        sizes in prop::collection::vec(1usize..17, 1..32),
    ) {
        let wire = encode_all(&calls);
        prop_assert_eq!(feed_chunked(&wire, &sizes), calls.clone());
        prop_assert_eq!(feed_chunked(&wire, &[wire.len()]), calls);
    }

    #[test]
    fn every_sink_sees_the_same_calls(
        calls in prop::collection::vec(arb_call(), 1..4),
        sinks in 1usize..5,
        split in 1usize..9,
    ) {
        let source = PipeNode::new();
        let channels: Vec<CallChannel<PipeNode>> =
            (0..sinks).map(|_| CallChannel::new(PipeNode::new())).collect();
        for channel in &channels {
            source.attach_sink(channel.pipe()).unwrap();
        }

        let wire = encode_all(&calls);
        for chunk in wire.chunks(split) {
            source.receive(Bytes::copy_from_slice(chunk), None);
        }

        for channel in &channels {
            prop_assert_eq!(channel.drain_calls().unwrap(), calls.clone());
        }
        prop_assert_eq!(source.buffered_len(), wire.len());
    }

    #[test]
    fn dropping_the_last_payload_byte_is_a_protocol_error(call in arb_call()) {
        let codec = FrameCodec::default();
        let frame = codec.serialize(call.name(), call.args()).unwrap();
        let payload = &frame[HEADER_SIZE..frame.len() - 1];

        // Header corrected to the shorter payload: the frame is complete
        // but its contents are cut off.
        let mut reframed = BytesMut::new();
        reframed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        reframed.extend_from_slice(payload);
        prop_assert!(matches!(
            codec.deserialize(&mut reframed),
            Err(FrameError::Protocol(_))
        ));

        // Stale header: the codec waits for the missing byte.
        let mut stale = BytesMut::from(&frame[..frame.len() - 1]);
        prop_assert_eq!(codec.deserialize(&mut stale).unwrap(), Decoded::Incomplete);
        prop_assert_eq!(stale.len(), frame.len() - 1);
    }
}

#[test]
fn one_byte_at_a_time() {
    let calls = vec![
        Call::new("echo").arg("hi"),
        Call::with_args("sum", 1..=8),
        Call::new("nested").arg(Value::List(vec![
            Value::Null,
            Value::Map(vec![("k".into(), Value::UInt(7))]),
        ])),
    ];
    let wire = encode_all(&calls);
    assert_eq!(feed_chunked(&wire, &[1]), calls);
}

#[test]
fn echo_split_at_every_point() {
    let frame = FrameCodec::default()
        .serialize("echo", &[Value::from("hi")])
        .unwrap();
    let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(declared, frame.len() - HEADER_SIZE);

    for split in 1..frame.len() {
        let channel = CallChannel::new(PipeNode::new());
        channel.pipe().receive(frame.slice(..split), None);
        assert!(channel.drain_calls().unwrap().is_empty(), "split {split}");

        channel.pipe().receive(frame.slice(split..), None);
        assert_eq!(
            channel.drain_calls().unwrap(),
            vec![Call::new("echo").arg("hi")],
            "split {split}"
        );
    }
}

#[test]
fn argument_cap_survives_the_wire() {
    let wide: Vec<Value> = (0..12i64).map(Value::Int).collect();
    let frame = FrameCodec::new(CodecConfig::default())
        .serialize("wide", &wide)
        .unwrap();

    let channel = CallChannel::new(PipeNode::new());
    channel.pipe().receive(frame, None);
    let calls = channel.drain_calls().unwrap();

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args(), &wide[..8]);
}
