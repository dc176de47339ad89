//! Recordings written with the writer and read back with the loader.

mod common;

use std::fs::File;
use std::io::BufReader;

use common::*;
use flightrec::chunk::{read_chunk_info, split_chunks};
use flightrec::config::{LoaderConfig, RecordingSettings};
use flightrec::constants::{DESCRIPTION, LABEL, TIMESTAMP, TIMESTAMP_TICKS};
use flightrec::parser::{load_file, load_stream, Value};
use flightrec::writer::{Builtin, FieldType, JdkType, Recordings};
use tempfile::TempDir;

#[test]
fn test_two_chunks_read_back_together_and_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.flr");

    let mut recording = Recordings::new_recording_with(&path, fixed_settings()).unwrap();
    let event = recording
        .register_event_type("demo.Event", |b| {
            b.add_annotation(LABEL, Some("Demo Event"))
                .add_field_with("msg", Builtin::String, |f| {
                    f.add_annotation(DESCRIPTION, Some("the message"));
                });
        })
        .unwrap();
    let hello = recording
        .new_value(event, |v| {
            v.put("startTime", START_TICKS + 10).put("msg", "hello");
        })
        .unwrap();
    let world = recording
        .new_value(event, |v| {
            v.put("startTime", START_TICKS + 20).put("msg", "world");
        })
        .unwrap();
    recording.write_event(&hello).unwrap();
    recording.rotate_chunk().unwrap();
    recording.write_event(&world).unwrap();
    recording.close().unwrap();

    let infos = read_chunk_info(BufReader::new(File::open(&path).unwrap())).unwrap();
    assert_eq!(infos.len(), 2);
    assert_eq!((infos[0].header.major, infos[0].header.minor), (2, 0));

    let loaded = load_file(&path, &LoaderConfig::default()).unwrap();
    assert_eq!(loaded.stats.chunk_count, 2);
    assert_eq!(loaded.stats.version, Some((2, 0)));
    let events = loaded.events.get("demo.Event").unwrap();
    assert_eq!(events.event_type().label, "Demo Event");
    let messages: Vec<String> = events
        .iter_by_start()
        .map(|item| item.get("msg").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(messages, vec!["hello", "world"]);
    let first = events.iter_by_start().next().unwrap();
    assert_eq!(first.start_time(), Some(epoch_of(START_TICKS + 10)));

    // every chunk carries its own metadata
    let chunks: Vec<Vec<u8>> = split_chunks(File::open(&path).unwrap())
        .collect::<anyhow::Result<_>>()
        .unwrap();
    for (chunk, expected) in chunks.iter().zip(["hello", "world"]) {
        let alone = load_stream(chunk.as_slice(), &[], &LoaderConfig::default()).unwrap();
        let events = alone.events.get("demo.Event").unwrap();
        assert_eq!(events.len(), 1);
        let item = events.iter().next().unwrap();
        assert_eq!(item.get("msg").unwrap().as_str(), Some(expected));
    }
}

#[test]
fn test_duration_events_share_one_schema_across_chunks() {
    let mut recording = Recordings::to_writer(Vec::new(), fixed_settings());
    let span = recording
        .register_event_type("demo.Span", |b| {
            b.add_field_with("endTime", Builtin::Long, |f| {
                f.add_annotation(TIMESTAMP, Some(TIMESTAMP_TICKS));
            })
            .add_field("value", Builtin::Int);
        })
        .unwrap();
    for (start, end, value) in [(0i64, 10i64, 1i32), (5, 15, 2)] {
        let v = recording
            .new_value(span, |v| {
                v.put("startTime", START_TICKS + start)
                    .put("endTime", START_TICKS + end)
                    .put("value", value);
            })
            .unwrap();
        recording.write_event(&v).unwrap();
    }
    recording.rotate_chunk().unwrap();
    let v = recording
        .new_value(span, |v| {
            v.put("startTime", START_TICKS + 20)
                .put("endTime", START_TICKS + 30)
                .put("value", 3i32);
        })
        .unwrap();
    recording.write_event(&v).unwrap();
    let bytes = recording.close().unwrap();

    let loaded = load_stream(bytes.as_slice(), &[], &LoaderConfig::default()).unwrap();
    assert_eq!(loaded.events.by_identifier("demo.Span").count(), 1);
    let spans = loaded.events.get("demo.Span").unwrap();
    assert_eq!(spans.len(), 3);
    assert_eq!(spans.lanes().len(), 2);
    for lane in spans.lanes() {
        for pair in lane.windows(2) {
            assert!(pair[0].end_time() <= pair[1].start_time());
        }
    }
    let event_type = spans.event_type();
    let duration_attributes = event_type
        .attributes()
        .iter()
        .filter(|a| a.field.identifier == "duration")
        .count();
    assert_eq!(duration_attributes, 1);
    let durations: Vec<i64> = spans
        .iter_by_start()
        .map(|i| i.get("duration").and_then(|d| d.as_long()).unwrap())
        .collect();
    assert_eq!(durations, vec![10, 10, 10]);
}

#[test]
fn test_pooled_self_references_resolve() {
    let mut recording = Recordings::to_writer(Vec::new(), fixed_settings());
    let node = recording
        .register_type("demo.Node", |b| {
            b.add_field("name", Builtin::String)
                .add_field("next", FieldType::SelfType);
        })
        .unwrap();
    let event = recording
        .register_event_type("demo.Walk", move |b| {
            b.add_field("head", node).add_field("tail", node);
        })
        .unwrap();
    let tail = recording
        .new_value(node, |v| {
            v.put("name", "b").put_null("next");
        })
        .unwrap();
    let head = {
        let tail = tail.clone();
        recording
            .new_value(node, move |v| {
                v.put("name", "a").put_value("next", tail);
            })
            .unwrap()
    };
    let walk = recording
        .new_value(event, |v| {
            v.put("startTime", START_TICKS)
                .put_value("head", head)
                .put_value("tail", tail);
        })
        .unwrap();
    recording.write_event(&walk).unwrap();
    let bytes = recording.close().unwrap();

    let loaded = load_stream(bytes.as_slice(), &[], &LoaderConfig::default()).unwrap();
    let item = loaded.events.get("demo.Walk").unwrap().iter().next().unwrap().clone();
    let head = item.get("head").unwrap();
    let head = head.as_struct().unwrap();
    assert_eq!(head.get("name").and_then(Value::as_str), Some("a"));
    let next = head.get("next").unwrap();
    assert_eq!(next.as_struct().unwrap().get("name").and_then(Value::as_str), Some("b"));
    assert!(next.as_struct().unwrap().get("next").unwrap().is_null());

    // one pool entry, one shared value
    let tail = item.get("tail").unwrap();
    assert!(tail.same_instance(next));
}

#[test]
fn test_jdk_types_through_constant_pool() {
    let settings = RecordingSettings {
        initialize_jdk_types: true,
        ..fixed_settings()
    };
    let mut recording = Recordings::to_writer(Vec::new(), settings);
    let event = recording.register_event_type("demo.Tick", |_| {}).unwrap();
    let thread_type = recording.predefined(JdkType::Thread).unwrap();
    let thread = recording
        .new_value(thread_type, |v| {
            v.put("javaName", "main").put("javaThreadId", 1i64).put_struct("group", |g| {
                g.put("name", "system").put_null("parent");
            });
        })
        .unwrap();
    let tick = recording
        .new_value(event, |v| {
            v.put("startTime", START_TICKS).put_value("eventThread", thread);
        })
        .unwrap();
    recording.write_event(&tick).unwrap();
    recording.write_event(&tick).unwrap();
    let bytes = recording.close().unwrap();

    let loaded = load_stream(bytes.as_slice(), &[], &LoaderConfig::default()).unwrap();
    let ticks = loaded.events.get("demo.Tick").unwrap();
    assert_eq!(ticks.len(), 2);
    let threads: Vec<Value> = ticks.iter().map(|i| i.get("eventThread").unwrap()).collect();
    let thread = threads[0].as_struct().unwrap();
    assert_eq!(thread.get("javaName").and_then(Value::as_str), Some("main"));
    let group = thread.get("group").unwrap().as_struct().unwrap();
    assert_eq!(group.get("name").and_then(Value::as_str), Some("system"));
    assert!(threads[0].same_instance(&threads[1]));
    assert!(ticks.iter().next().unwrap().get("stackTrace").unwrap().is_null());
}

#[test]
fn test_predefined_types_need_initialization() {
    let recording = Recordings::to_writer(Vec::new(), fixed_settings());
    let err = recording.predefined(JdkType::StackTrace).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<flightrec::TypeRegistrationError>(),
        Some(flightrec::TypeRegistrationError::IllegalArgument { .. })
    ));
    assert!(recording.get_type("java.lang.Thread").is_none());
}

#[test]
fn test_failed_type_does_not_break_recording() {
    let mut recording = Recordings::to_writer(Vec::new(), fixed_settings());
    let broken = recording
        .register_event_type("demo.Broken", |b| {
            b.add_field("x", "demo.DoesNotExist");
        })
        .unwrap();
    assert!(recording.new_value(broken, |_| {}).is_err());

    let event = recording
        .register_event_type("demo.Fine", |b| {
            b.add_field("x", Builtin::Long);
        })
        .unwrap();
    let fine = recording
        .new_value(event, |v| {
            v.put("startTime", START_TICKS).put("x", 7i64);
        })
        .unwrap();
    recording.write_event(&fine).unwrap();
    let bytes = recording.close().unwrap();

    let loaded = load_stream(bytes.as_slice(), &[], &LoaderConfig::default()).unwrap();
    assert!(loaded.events.get("demo.Broken").is_none());
    let fine = loaded.events.get("demo.Fine").unwrap();
    assert_eq!(fine.iter().next().unwrap().get("x").and_then(|v| v.as_long()), Some(7));
}
