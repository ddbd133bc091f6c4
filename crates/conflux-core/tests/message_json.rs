#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use conflux_core::msg::{
    AudioFrame, AudioFrameDataFmt, Cmd, CmdResult, Data, FieldData, Loc, Message, Msg, MsgType,
    PixelFmt, StatusCode, VideoFrame,
};
use conflux_core::{ErrorCode, Value};

fn routed<M: Msg>(mut m: M) -> M {
    m.set_src(Loc::new(Some("localhost"), Some("g0"), Some("grp"), Some("a")));
    m.add_dest(Loc::extension("b"));
    m.add_dest(Loc::extension("c"));
    m.set_property("greeting", "hi").unwrap();
    m.set_property("nested.list[1]", 3i64).unwrap();
    m
}

fn round_trip(m: Message) {
    let text = m.to_json().unwrap().to_string();
    let back = Message::from_json_str(&text).unwrap();
    assert_eq!(back, m, "round trip of {}", m.msg_type());
}

#[test]
fn every_variant_round_trips() {
    let mut cmd = routed(Cmd::new("hello"));
    cmd.set_seq_id("11");
    round_trip(cmd.clone().into());

    let mut result = routed(CmdResult::for_cmd(StatusCode::Error, &cmd));
    result.set_final(false);
    result.set_detail("nope");
    round_trip(result.into());

    let mut data = routed(Data::new("blob"));
    data.alloc_buf(5).copy_from_slice(b"hello");
    round_trip(data.into());

    let mut audio = routed(AudioFrame::new("pcm"));
    audio.sample_rate = 16_000;
    audio.bytes_per_sample = 2;
    audio.samples_per_channel = 160;
    audio.number_of_channel = 1;
    audio.channel_layout = 4;
    audio.data_fmt = AudioFrameDataFmt::NonInterleave;
    audio.line_size = 320;
    audio.timestamp = -5;
    audio.is_eof = true;
    audio.set_buf(vec![0u8, 1, 2, 3]);
    round_trip(audio.into());

    let mut video = routed(VideoFrame::new("cam"));
    video.pixel_fmt = PixelFmt::Nv12;
    video.width = 1920;
    video.height = 1080;
    video.timestamp = 1_700_000_000_000;
    video.set_buf(vec![7u8; 6]);
    round_trip(video.into());
}

#[test]
fn properties_sit_at_the_root() {
    let mut cmd = Cmd::new("hello");
    cmd.set_property("k", 1i64).unwrap();
    let json = cmd.to_json().unwrap();
    assert_eq!(json["k"], 1);
    assert_eq!(json["_conflux"]["type"], "cmd");
    assert_eq!(json["_conflux"]["name"], "hello");
    assert_eq!(json["_conflux"]["cmd_id"], cmd.cmd_id());
}

#[test]
fn wrong_type_is_rejected() {
    let err = Cmd::from_json_str(r#"{"_conflux":{"type":"data","name":"x"}}"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);

    let err = Message::from_json_str(r#"{"k":1}"#).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);
}

#[test]
fn failed_init_leaves_message_untouched() {
    let mut frame = VideoFrame::new("cam");
    frame.set_property("keep", true).unwrap();
    let before = frame.clone();

    // width parses, height is out of range: nothing may stick
    let err = frame
        .init_from_json(r#"{"_conflux":{"width":10,"height":5000000000},"extra":1}"#)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidMessage);
    assert_eq!(frame, before);

    frame
        .init_from_json(r#"{"_conflux":{"width":10,"height":20},"extra":1}"#)
        .unwrap();
    assert_eq!((frame.width, frame.height), (10, 20));
    assert_eq!(frame.peek_property("keep").unwrap(), Some(Value::Bool(true)));
    assert_eq!(frame.peek_property("extra").unwrap(), Some(Value::Int64(1)));
}

#[test]
fn visitor_sees_type_first_and_can_rewrite() {
    let mut seen = Vec::new();
    let mut data = Data::new("d");
    data.for_each_field(&mut |t: MsgType, f: &mut FieldData| -> conflux_core::Result<()> {
        seen.push(f.name);
        if f.name == "name" {
            assert_eq!(t, MsgType::Data);
            f.replace(Value::from("renamed"));
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(seen[0], "type");
    assert_eq!(data.name(), "renamed");
    assert!(seen.contains(&"buf"));
}

#[test]
fn internal_namespace_peek() {
    let mut cmd = Cmd::new("hello");
    cmd.set_seq_id("3");
    let internal = cmd.peek_property("_conflux").unwrap().unwrap();
    assert_eq!(internal.get("seq_id"), Some(&Value::from("3")));
    assert_eq!(internal.get("type"), Some(&Value::from("cmd")));
    assert!(internal.get("properties").is_none());

    let whole = cmd.peek_property("").unwrap().unwrap();
    assert!(whole.as_object().unwrap().is_empty());
}
