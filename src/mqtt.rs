//! MQTT remote control
//!
//! Connects to a broker and subscribes to one topic. Each message is a JSON
//! command tagged by `op`; parsed commands are handed to the main loop over a
//! channel and applied to the engine there.

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use crate::animation::{AnimationSpec, Param};
use crate::device::Device;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::geometry::Placement;
use crate::input::Gesture;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "ledwall/command";

fn unit_zoom() -> f64 {
    1.0
}

/// A layout or input command received from the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteCommand {
    AddRegion {
        id: String,
        placement: Placement,
        animation: AnimationSpec,
    },
    UpdateRegion {
        id: String,
        placement: Placement,
    },
    RemoveRegion {
        id: String,
    },
    BringToFront {
        id: String,
    },
    SetParam {
        id: String,
        param: Param,
    },
    UpsertDevice {
        device: Device,
    },
    RemoveDevice {
        id: String,
    },
    Touch {
        x: f64,
        y: f64,
    },
    Transform {
        x: f64,
        y: f64,
        #[serde(default)]
        pan_x: f64,
        #[serde(default)]
        pan_y: f64,
        #[serde(default = "unit_zoom")]
        zoom: f64,
        #[serde(default)]
        rotation: f64,
    },
    /// Write the current layout; falls back to the installation the program was started with
    Save {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl RemoteCommand {
    pub fn parse(payload: &[u8]) -> EngineResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn apply(self, engine: &Engine, installation_path: Option<&Path>) -> EngineResult<()> {
        match self {
            RemoteCommand::AddRegion {
                id,
                placement,
                animation,
            } => engine.add_region_spec(id, placement, &animation),
            RemoteCommand::UpdateRegion { id, placement } => engine.update_region(&id, placement),
            RemoteCommand::RemoveRegion { id } => engine.remove_region(&id),
            RemoteCommand::BringToFront { id } => engine.bring_to_front(&id),
            RemoteCommand::SetParam { id, param } => {
                if !engine.set_region_param(&id, param)? {
                    tracing::warn!(region = %id, "parameter value rejected by animation");
                }
                Ok(())
            }
            RemoteCommand::UpsertDevice { device } => engine.upsert_device(device).map(|_| ()),
            RemoteCommand::RemoveDevice { id } => engine.remove_device(&id).map(|_| ()),
            RemoteCommand::Touch { x, y } => {
                let handled = engine.route_touch(x, y);
                tracing::debug!(x, y, handled, "remote touch");
                Ok(())
            }
            RemoteCommand::Transform {
                x,
                y,
                pan_x,
                pan_y,
                zoom,
                rotation,
            } => {
                let gesture = Gesture {
                    pan_x,
                    pan_y,
                    zoom,
                    rotation,
                };
                let handled = engine.route_transform(x, y, gesture);
                tracing::debug!(x, y, handled, "remote transform");
                Ok(())
            }
            RemoteCommand::Save { path } => {
                let path = path
                    .as_deref()
                    .or(installation_path)
                    .ok_or_else(|| EngineError::Remote("save needs a path".into()))?;
                engine.export_installation().save(path)?;
                tracing::info!(path = %path.display(), "installation saved");
                Ok(())
            }
        }
    }
}

/// MQTT client that receives commands in a background thread
pub struct RemoteControl {
    receiver: Receiver<RemoteCommand>,
    _thread: thread::JoinHandle<()>,
}

impl RemoteControl {
    /// Connect and subscribe. Fails immediately if the broker is unreachable.
    pub fn connect(host: &str, port: u16, topic: &str) -> EngineResult<Self> {
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let topic = if topic.is_empty() { DEFAULT_TOPIC } else { topic };

        let mut options = MqttOptions::new("ledwall", host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut connection) = Client::new(options, 10);

        client.subscribe(topic, QoS::AtMostOnce).map_err(|e| {
            EngineError::Remote(format!("failed to subscribe to topic '{}': {}", topic, e))
        })?;

        // Poll once so an unreachable broker fails here rather than in the background
        match connection.iter().next() {
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                return Err(EngineError::Remote(format!(
                    "failed to connect to {}:{}: {}",
                    host, port, e
                )));
            }
            None => {
                return Err(EngineError::Remote(format!(
                    "failed to connect to {}:{}: connection closed",
                    host, port
                )));
            }
        }

        let (sender, receiver) = mpsc::channel();
        let topic_owned = topic.to_string();

        let handle = thread::Builder::new()
            .name("ledwall-mqtt".into())
            .spawn(move || {
                // The client must outlive the event loop or the connection closes
                let _client = client;
                Self::message_loop(connection, &sender, &topic_owned);
            })
            .map_err(EngineError::Spawn)?;

        tracing::info!(host, port, topic, "remote control connected");

        Ok(Self {
            receiver,
            _thread: handle,
        })
    }

    fn message_loop(mut connection: Connection, sender: &Sender<RemoteCommand>, topic: &str) {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == topic => {
                    match RemoteCommand::parse(&publish.payload) {
                        Ok(command) => {
                            if sender.send(command).is_err() {
                                // Main loop gone
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "ignoring malformed command"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // rumqttc reconnects on the next poll
                    tracing::warn!(error = %e, "mqtt connection error");
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
    }

    /// Every command received since the last poll, oldest first (non-blocking)
    pub fn poll(&self) -> Vec<RemoteCommand> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::Color;
    use crate::engine::EngineConfig;

    fn engine() -> Engine {
        Engine::new(&EngineConfig::default().with_base(100.0, 100.0))
    }

    fn run(engine: &Engine, json: &str) -> EngineResult<()> {
        RemoteCommand::parse(json.as_bytes())?.apply(engine, None)
    }

    #[test]
    fn add_move_reorder_remove() {
        let engine = engine();
        run(
            &engine,
            r#"{"op":"add_region","id":"a","placement":{"x":0,"y":0,"width":10,"height":10},
                "animation":{"kind":"solid","color":{"r":255,"g":0,"b":0}}}"#,
        )
        .unwrap();
        run(
            &engine,
            r#"{"op":"add_region","id":"b","placement":{"x":0,"y":0,"width":10,"height":10},
                "animation":{"kind":"plasma"}}"#,
        )
        .unwrap();
        run(
            &engine,
            r#"{"op":"update_region","id":"a","placement":{"x":5,"y":5,"width":20,"height":20,"rotation":45}}"#,
        )
        .unwrap();
        run(&engine, r#"{"op":"bring_to_front","id":"a"}"#).unwrap();

        let regions = engine.regions();
        assert_eq!(regions[1].id(), "a");
        assert_eq!(regions[1].placement().rotation, 45.0);

        run(&engine, r#"{"op":"remove_region","id":"a"}"#).unwrap();
        assert_eq!(engine.regions().len(), 1);
        assert!(matches!(
            run(&engine, r#"{"op":"remove_region","id":"a"}"#),
            Err(EngineError::UnknownRegion(_))
        ));
    }

    #[test]
    fn set_param_goes_through_capabilities() {
        let engine = engine();
        engine
            .add_region_spec(
                "s",
                Placement::new(0.0, 0.0, 10.0, 10.0),
                &AnimationSpec::Solid { color: Color::RED },
            )
            .unwrap();
        run(
            &engine,
            r#"{"op":"set_param","id":"s","param":{"kind":"primary_color","value":{"r":0,"g":0,"b":255}}}"#,
        )
        .unwrap();
        assert_eq!(
            engine
                .region_param("s", crate::animation::ParamKind::PrimaryColor)
                .unwrap(),
            Some(Param::PrimaryColor(Color::BLUE))
        );
        assert!(matches!(
            run(&engine, r#"{"op":"set_param","id":"s","param":{"kind":"speed","value":2.0}}"#),
            Err(EngineError::UnsupportedParam { .. })
        ));
    }

    #[test]
    fn devices_can_be_upserted_and_removed() {
        let engine = engine();
        let json = r#"{"op":"upsert_device","device":{"id":"d","address":"10.0.0.2",
            "pixel_count":16,"x":0,"y":0,"width":40,"height":40,"segment_width":4,"serpentine":true}}"#;
        run(&engine, json).unwrap();
        run(&engine, json).unwrap();
        let devices = engine.devices();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].serpentine);
        run(&engine, r#"{"op":"remove_device","id":"d"}"#).unwrap();
        assert!(engine.devices().is_empty());
    }

    #[test]
    fn transform_defaults_to_identity_gesture() {
        let command = RemoteCommand::parse(br#"{"op":"transform","x":1,"y":2}"#).unwrap();
        assert_eq!(
            command,
            RemoteCommand::Transform {
                x: 1.0,
                y: 2.0,
                pan_x: 0.0,
                pan_y: 0.0,
                zoom: 1.0,
                rotation: 0.0
            }
        );
        assert!(run(&engine(), r#"{"op":"touch","x":5,"y":5}"#).is_ok());
    }

    #[test]
    fn save_writes_installation() {
        let engine = engine();
        engine
            .add_region_spec(
                "s",
                Placement::new(0.0, 0.0, 10.0, 10.0),
                &AnimationSpec::Solid { color: Color::GREEN },
            )
            .unwrap();
        let path = std::env::temp_dir().join(format!("ledwall-mqtt-save-{}.json", std::process::id()));
        RemoteCommand::Save { path: None }
            .apply(&engine, Some(&path))
            .unwrap();
        let saved = crate::installation::Installation::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(saved.regions.len(), 1);

        assert!(matches!(
            RemoteCommand::Save { path: None }.apply(&engine, None),
            Err(EngineError::Remote(_))
        ));
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(RemoteCommand::parse(b"not json").is_err());
        assert!(RemoteCommand::parse(br#"{"op":"explode"}"#).is_err());
    }
}
