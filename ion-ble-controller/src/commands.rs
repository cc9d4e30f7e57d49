//! Lamp commands
//!
//! Names are resolved against the catalog and values are range checked
//! before anything is sent, so a validation error never reaches the lamp.

use chrono::Timelike;
use ion_proto::{
    BANK_COUNT, Body, Command, DeviceSettings, LED_COUNT, NotificationConfig, NotificationPattern,
    Packet, Rgb, Weather,
};
use tracing::info;

use crate::catalog::Catalog;
use crate::lamp::{Lamp, Mood};
use crate::transport::Central;
use crate::LampError;

/// Value for `Lamp::set_mood_config`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValue {
    /// The catalog default for this config
    Default,
    Value(i64),
    /// Only valid for "Color" configs
    Color { hue: i64, saturation: i64 },
}

/// Look of a notification shown with `Lamp::show_notification`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationStyle {
    pub hue: u16,
    pub brightness: u8,
    pub saturation: u8,
    pub speed: u8,
    pub duration: u8,
    pub sticky: bool,
}

const SATURATION_MAX: u32 = 255;

/// Commands for setting one mood config; two of them (hue, then saturation
/// at the next config id) for colors.
pub(crate) fn mood_config_commands(
    catalog: &Catalog,
    mood: &str,
    config: &str,
    value: ConfigValue,
) -> Result<Vec<Command>, LampError> {
    let (mood, descriptor) = catalog
        .mood_config(mood, config)
        .ok_or_else(|| LampError::InvalidParameters(format!("no config {config:?} for mood {mood:?}")))?;

    let checked = |value: i64| -> Result<u32, LampError> {
        if !descriptor.contains(value) {
            return Err(LampError::InvalidParameters(format!(
                "{value} is outside {}..={} for {}",
                descriptor.min, descriptor.max, descriptor.name
            )));
        }
        u32::try_from(value).map_err(|_| LampError::InvalidParameters(format!("{value} is negative")))
    };
    let checked_saturation = |value: i64| -> Result<u32, LampError> {
        u32::try_from(value)
            .ok()
            .filter(|s| *s <= SATURATION_MAX)
            .ok_or_else(|| {
                LampError::InvalidParameters(format!("saturation {value} is outside 0..={SATURATION_MAX}"))
            })
    };

    let set = |config_id: u8, value: u32| Command::SetMoodConfig {
        mood_id: mood.id,
        config_id,
        value,
    };

    match (descriptor.is_color(), value) {
        (true, ConfigValue::Color { hue, saturation }) => {
            let saturation_id = descriptor.id.checked_add(1).ok_or_else(|| {
                LampError::InvalidParameters(format!("config id {} has no saturation slot", descriptor.id))
            })?;
            Ok(vec![
                set(descriptor.id, checked(hue)?),
                set(saturation_id, checked_saturation(saturation)?),
            ])
        }
        (true, _) => Err(LampError::InvalidParameters(format!(
            "{} needs both hue and saturation",
            descriptor.name
        ))),
        (false, ConfigValue::Default) => Ok(vec![set(descriptor.id, descriptor.default)]),
        (false, ConfigValue::Value(value)) => Ok(vec![set(descriptor.id, checked(value)?)]),
        (false, ConfigValue::Color { .. }) => Err(LampError::InvalidParameters(format!(
            "{} is not a color config",
            descriptor.name
        ))),
    }
}

fn unexpected(packet: &Packet) -> LampError {
    LampError::UnexpectedReply(packet.op_code)
}

impl<C: Central> Lamp<C> {
    fn mood_by_id(&self, id: u8) -> Mood {
        Mood { id, name: self.catalog().mood_name(id) }
    }

    fn mood_id(&self, name: &str) -> Result<u8, LampError> {
        self.catalog()
            .mood(name)
            .map(|m| m.id)
            .ok_or_else(|| LampError::UnknownMood(name.to_string()))
    }

    fn notification_id(&self, name: &str) -> Result<u8, LampError> {
        self.catalog()
            .notification(name)
            .map(|n| n.id)
            .ok_or_else(|| LampError::UnknownNotification(name.to_string()))
    }

    pub async fn get_mood(&self) -> Result<Mood, LampError> {
        let reply = self.send(Command::GetCurrentMood).await?;
        match reply.body {
            Body::CurrentMood(id) => Ok(self.mood_by_id(id)),
            _ => Err(unexpected(&reply)),
        }
    }

    pub async fn set_mood(&self, name: &str) -> Result<(), LampError> {
        let mood_id = self.mood_id(name)?;
        info!(mood = name, mood_id, "setting mood");
        self.send(Command::SetCurrentMood { mood_id }).await?;
        Ok(())
    }

    pub async fn get_mood_config(&self, mood: &str, config: &str) -> Result<u32, LampError> {
        let (mood_id, config_id) = self
            .catalog()
            .mood_config(mood, config)
            .map(|(m, c)| (m.id, c.id))
            .ok_or_else(|| LampError::InvalidParameters(format!("no config {config:?} for mood {mood:?}")))?;

        let reply = self.send(Command::GetMoodConfig { mood_id, config_id }).await?;
        match reply.body {
            Body::MoodConfig(config) => Ok(config.value),
            _ => Err(unexpected(&reply)),
        }
    }

    /// Color configs go out as two packets, hue first, under consecutive
    /// request ids
    pub async fn set_mood_config(&self, mood: &str, config: &str, value: ConfigValue) -> Result<(), LampError> {
        let commands = mood_config_commands(self.catalog(), mood, config, value)?;
        self.request_all(&commands, false).await?;
        Ok(())
    }

    pub async fn save_mood_configs(&self) -> Result<(), LampError> {
        self.send(Command::SaveMoodConfigs).await?;
        Ok(())
    }

    pub async fn restore_mood_configs(&self) -> Result<(), LampError> {
        self.send(Command::RestoreMoodConfigs).await?;
        Ok(())
    }

    /// Names longer than 18 characters are cut short by the lamp protocol
    pub async fn rename(&self, name: &str) -> Result<(), LampError> {
        if name.trim().is_empty() {
            return Err(LampError::InvalidParameters("device name is empty".to_string()));
        }
        info!(name, "renaming lamp");
        self.send(Command::SetDeviceName(name.to_string())).await?;
        Ok(())
    }

    pub async fn get_device_settings(&self) -> Result<DeviceSettings, LampError> {
        let reply = self.send(Command::GetDeviceSettings).await?;
        match reply.body {
            Body::DeviceSettings(settings) => Ok(settings),
            _ => Err(unexpected(&reply)),
        }
    }

    pub async fn set_device_settings(&self, settings: DeviceSettings) -> Result<(), LampError> {
        self.send(Command::SetDeviceSettings(settings)).await?;
        Ok(())
    }

    /// Moods in the shuffle rotation. Ids the catalog does not know come back
    /// without a name.
    pub async fn get_rotation(&self) -> Result<Vec<Mood>, LampError> {
        let reply = self.send(Command::GetRotation).await?;
        match reply.body {
            Body::Rotation(ids) => Ok(ids.into_iter().map(|id| self.mood_by_id(id)).collect()),
            _ => Err(unexpected(&reply)),
        }
    }

    pub async fn set_rotation<S: AsRef<str>>(&self, moods: &[S]) -> Result<(), LampError> {
        let ids = moods
            .iter()
            .map(|name| self.mood_id(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.send(Command::UpdateRotation(ids)).await?;
        Ok(())
    }

    pub async fn get_notification_config(&self, notification: &str) -> Result<NotificationConfig, LampError> {
        let notification_id = self.notification_id(notification)?;
        let reply = self.send(Command::GetNotificationConfig { notification_id }).await?;
        match reply.body {
            Body::NotificationConfig(config) => Ok(config),
            _ => Err(unexpected(&reply)),
        }
    }

    /// Store `config` for `notification`; its `notification_id` is replaced
    /// with the catalog id
    pub async fn set_notification_config(
        &self,
        notification: &str,
        config: NotificationConfig,
    ) -> Result<(), LampError> {
        let notification_id = self.notification_id(notification)?;
        let config = NotificationConfig { notification_id, ..config };
        self.send(Command::SetNotificationConfig(config)).await?;
        Ok(())
    }

    pub async fn trigger_notification(&self, notification: &str) -> Result<(), LampError> {
        let notification_id = self.notification_id(notification)?;
        self.send(Command::TriggerNotification { notification_id }).await?;
        Ok(())
    }

    /// Show `pattern` once with the given look, without touching stored configs
    pub async fn show_notification(&self, pattern: &str, style: NotificationStyle) -> Result<(), LampError> {
        let pattern_id = self.notification_id(pattern)?;
        let pattern = NotificationPattern {
            pattern_id,
            hue: style.hue,
            brightness: style.brightness,
            saturation: style.saturation,
            speed: style.speed,
            duration: style.duration,
            sticky: style.sticky,
        };
        self.send(Command::ShowNotification(pattern)).await?;
        Ok(())
    }

    pub async fn clear_notification(&self) -> Result<(), LampError> {
        self.send(Command::ClearNotification).await?;
        Ok(())
    }

    /// Reboot into the bootloader. The lamp drops the connection and comes
    /// back advertising the DFU service.
    pub async fn enter_dfu_mode(&self) -> Result<(), LampError> {
        info!("asking lamp to enter DFU mode");
        self.send(Command::EnterDfuMode).await?;
        Ok(())
    }

    pub async fn begin_bond(&self) -> Result<(), LampError> {
        self.send(Command::BeginBond).await?;
        Ok(())
    }

    /// Set the lamp clock to local time
    pub async fn set_time(&self) -> Result<(), LampError> {
        let now = chrono::Local::now();
        self.send(Command::SetTime {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        })
        .await?;
        Ok(())
    }

    pub async fn set_weather(&self, weather: Weather) -> Result<(), LampError> {
        self.send(Command::SetWeather(weather)).await?;
        Ok(())
    }

    /// Change one slot of the raw buffer. Nothing is sent until `show`.
    pub fn set_raw_led(&self, index: usize, color: Rgb) -> &Self {
        self.with_raw(|raw| raw.set_led(index, color));
        self
    }

    pub fn raw_led(&self, index: usize) -> Option<Rgb> {
        self.with_raw(|raw| raw.led(index))
    }

    /// Send a single buffered LED straight away
    pub async fn send_raw_led(&self, index: usize) -> Result<(), LampError> {
        let color = self
            .raw_led(index)
            .ok_or_else(|| LampError::InvalidParameters(format!("led {index} is out of range 0..{LED_COUNT}")))?;
        self.send(Command::SetRawLed { led_id: index as u8, color }).await?;
        Ok(())
    }

    pub async fn raw_clear_all(&self) -> Result<(), LampError> {
        self.with_raw(|raw| raw.clear());
        self.send(Command::SetRawClearAll).await?;
        Ok(())
    }

    pub async fn raw_fill(&self, color: Rgb) -> Result<(), LampError> {
        self.with_raw(|raw| raw.fill(color));
        self.send(Command::SetRawFillColor(color)).await?;
        Ok(())
    }

    /// Send every dirty bank in order, then refresh. The first failure stops
    /// the flush; banks already acked stay clean.
    pub async fn show(&self) -> Result<(), LampError> {
        let _flush = self.inner.flush_lock.lock().await;

        for bank_id in 0..BANK_COUNT {
            let colors = self.with_raw(|raw| {
                if raw.bank_requires_update(bank_id) {
                    raw.bank(bank_id)
                } else {
                    None
                }
            });
            let Some(colors) = colors else {
                continue;
            };

            self.send(Command::SetRawBank { bank_id: bank_id as u8, colors }).await?;
            // a slot changed while the bank was in flight keeps it dirty
            self.with_raw(|raw| raw.mark_bank_sent(bank_id, &colors));
        }

        self.send(Command::SetRawRefresh).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_catalog;
    use crate::mock::{MockCentral, lamp_config, ready_lamp};
    use ion_proto::{
        NakReason, OP_BEGIN_BOND, OP_GET_DEVICE_SETTINGS, OP_SET_DEVICE_SETTINGS, OP_SET_MOOD_CONFIG,
        OP_SET_RAW_BANK, OP_SET_RAW_CLEAR_ALL, OP_SET_RAW_FILL_COLOR, OP_SET_RAW_LED, OP_SET_RAW_REFRESH,
        OP_SET_TIME,
    };

    /// Run `f` against a ready lamp and return the packets it wrote
    async fn writes_of<F, Fut>(central: &MockCentral, lamp: &Lamp<MockCentral>, f: F) -> Vec<Vec<u8>>
    where
        F: FnOnce(Lamp<MockCentral>) -> Fut,
        Fut: std::future::Future<Output = Result<(), LampError>>,
    {
        let before = central.peripheral().writes().len();
        f(lamp.clone()).await.unwrap();
        central.peripheral().writes()[before..].to_vec()
    }

    #[test]
    fn color_config_is_hue_then_saturation() {
        let commands = mood_config_commands(
            &test_catalog(),
            "digital rain",
            "Color",
            ConfigValue::Color { hue: 200, saturation: 255 },
        )
        .unwrap();

        assert_eq!(
            commands,
            vec![
                Command::SetMoodConfig { mood_id: 12, config_id: 1, value: 200 },
                Command::SetMoodConfig { mood_id: 12, config_id: 2, value: 255 },
            ]
        );
    }

    #[test]
    fn color_bounds_are_checked() {
        let catalog = test_catalog();
        let color = |hue, saturation| ConfigValue::Color { hue, saturation };

        for value in [color(360, 10), color(-1, 10), color(10, 256), color(10, -1)] {
            let err = mood_config_commands(&catalog, "digitalrain", "color", value).unwrap_err();
            assert!(matches!(err, LampError::InvalidParameters(_)), "{value:?}");
        }
        assert!(mood_config_commands(&catalog, "digitalrain", "color", ConfigValue::Value(20)).is_err());
        assert!(mood_config_commands(&catalog, "digitalrain", "color", ConfigValue::Default).is_err());
    }

    #[test]
    fn plain_config_uses_default_when_no_value() {
        let catalog = test_catalog();
        assert_eq!(
            mood_config_commands(&catalog, "Pulse", "brightness", ConfigValue::Default).unwrap(),
            vec![Command::SetMoodConfig { mood_id: 7, config_id: 1, value: 200 }]
        );
        assert_eq!(
            mood_config_commands(&catalog, "Pulse", "brightness", ConfigValue::Value(10)).unwrap(),
            vec![Command::SetMoodConfig { mood_id: 7, config_id: 1, value: 10 }]
        );
        assert!(mood_config_commands(&catalog, "Pulse", "brightness", ConfigValue::Value(9)).is_err());
        assert!(mood_config_commands(&catalog, "Pulse", "speed", ConfigValue::Value(5)).is_err());
        assert!(mood_config_commands(&catalog, "nope", "speed", ConfigValue::Value(5)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn color_config_goes_out_under_consecutive_ids() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        let before = central.peripheral().writes().len();

        lamp.set_mood_config("Digital Rain", "Color", ConfigValue::Color { hue: 200, saturation: 255 })
            .await
            .unwrap();

        let writes = central.peripheral().writes();
        let sent = &writes[before..];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][1], OP_SET_MOOD_CONFIG);
        assert_eq!(sent[1][1], OP_SET_MOOD_CONFIG);
        assert_eq!(sent[1][0], sent[0][0] + 1);
        assert_eq!(sent[0][2..4], [12, 1]);
        assert_eq!(sent[1][2..4], [12, 2]);
        assert_eq!(sent[0][4..8], 200u32.to_le_bytes());
        assert_eq!(sent[1][4..8], 255u32.to_le_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_send_nothing() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        let before = central.peripheral().writes().len();

        assert_eq!(lamp.set_mood("disco").await, Err(LampError::UnknownMood("disco".into())));
        assert_eq!(
            lamp.trigger_notification("siren").await,
            Err(LampError::UnknownNotification("siren".into()))
        );
        assert!(matches!(
            lamp.set_mood_config("pulse", "brightness", ConfigValue::Value(256)).await,
            Err(LampError::InvalidParameters(_))
        ));
        assert_eq!(
            lamp.set_rotation(&["candle", "disco"]).await,
            Err(LampError::UnknownMood("disco".into()))
        );
        assert!(matches!(lamp.rename("  ").await, Err(LampError::InvalidParameters(_))));

        assert_eq!(central.peripheral().writes().len(), before);
        assert_eq!(lamp.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn nak_reaches_the_caller() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        central
            .peripheral()
            .reply_with(|id, _| Some(Packet::new(id, Body::Nak(NakReason::UnknownMood))));

        assert_eq!(lamp.set_mood("candle").await, Err(LampError::Nak(NakReason::UnknownMood)));
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_maps_ids_to_names() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        central
            .peripheral()
            .reply_with(|id, _| Some(Packet::new(id, Body::Rotation(vec![12, 99, 3]))));

        let rotation = lamp.get_rotation().await.unwrap();
        let names: Vec<_> = rotation.iter().map(|m| m.name.as_deref()).collect();
        assert_eq!(names, vec![Some("digitalrain"), None, Some("candle")]);
        assert_eq!(rotation[1].id, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn show_sends_dirty_banks_then_refresh() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        let before = central.peripheral().writes().len();

        lamp.set_raw_led(0, Rgb::new(255, 0, 0))
            .set_raw_led(4, Rgb::new(0, 255, 0))
            .set_raw_led(37, Rgb::new(0, 0, 255));
        lamp.show().await.unwrap();

        let writes = central.peripheral().writes();
        let sent = &writes[before..];
        let ops: Vec<_> = sent.iter().map(|w| w[1]).collect();
        assert_eq!(ops, vec![OP_SET_RAW_BANK, OP_SET_RAW_BANK, OP_SET_RAW_REFRESH]);
        assert_eq!(sent[0][2], 0);
        assert_eq!(sent[0][3..6], [255, 0, 0]);
        assert_eq!(sent[0][15..18], [0, 255, 0]);
        assert_eq!(sent[1][2], 7);
        assert_eq!(sent[1][9..12], [0, 0, 255]);
        assert_eq!(lamp.with_raw(|raw| raw.dirty_banks().count()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn show_stops_at_first_failure() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;

        lamp.set_raw_led(2, Rgb::new(1, 2, 3)).set_raw_led(12, Rgb::new(4, 5, 6));
        central.peripheral().reply_with(|id, data| {
            if data[1] == OP_SET_RAW_BANK && data[2] == 2 {
                Some(Packet::new(id, Body::Nak(NakReason::InvalidOpCode)))
            } else {
                Some(Packet::new(id, Body::Ack))
            }
        });
        let before = central.peripheral().writes().len();

        assert_eq!(lamp.show().await, Err(LampError::Nak(NakReason::InvalidOpCode)));

        let writes = central.peripheral().writes();
        let ops: Vec<_> = writes[before..].iter().map(|w| (w[1], w[2])).collect();
        assert_eq!(ops, vec![(OP_SET_RAW_BANK, 0), (OP_SET_RAW_BANK, 2)]);

        // bank 0 was acked, bank 2 is still pending
        let dirty = lamp.with_raw(|raw| raw.dirty_banks().collect::<Vec<_>>());
        assert_eq!(dirty, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_need_a_ready_lamp() {
        let central = MockCentral::new();
        let lamp = Lamp::new(central.clone(), "ION-1", lamp_config(), test_catalog());
        let mut events = lamp.subscribe();

        assert_eq!(lamp.get_mood().await, Err(LampError::NotReady));
        assert!(central.peripheral().writes().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn set_time_sends_a_clock_reading() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;

        let sent = writes_of(&central, &lamp, |lamp| async move { lamp.set_time().await }).await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][1], OP_SET_TIME);
        assert_eq!(sent[0].len(), 5);
        assert!(sent[0][2] < 24 && sent[0][3] < 60 && sent[0][4] < 60);
    }

    #[tokio::test(start_paused = true)]
    async fn begin_bond_has_no_payload() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;

        let sent = writes_of(&central, &lamp, |lamp| async move { lamp.begin_bond().await }).await;

        assert_eq!(sent, vec![vec![sent[0][0], OP_BEGIN_BOND]]);
    }

    #[tokio::test(start_paused = true)]
    async fn device_settings_round_trip_through_the_lamp() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        let settings = DeviceSettings {
            knock_enabled: true,
            quiet_time_enabled: true,
            quiet_hour_start: 22,
            quiet_hour_end: 7,
            shuffle_time: 30,
            ..Default::default()
        };

        let sent =
            writes_of(&central, &lamp, |lamp| async move { lamp.set_device_settings(settings).await }).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][1], OP_SET_DEVICE_SETTINGS);
        assert_eq!(sent[0][2..], [1, 1, 22, 0, 7, 0, 30, 0, 0]);

        central.peripheral().reply_with(move |id, data| {
            assert_eq!(data[1], OP_GET_DEVICE_SETTINGS);
            Some(Packet::new(id, Body::DeviceSettings(settings)))
        });
        assert_eq!(lamp.get_device_settings().await, Ok(settings));
    }

    #[tokio::test(start_paused = true)]
    async fn fill_and_clear_reset_the_buffer() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        lamp.set_raw_led(3, Rgb::new(9, 9, 9));

        let sent =
            writes_of(&central, &lamp, |lamp| async move { lamp.raw_fill(Rgb::new(10, 20, 30)).await }).await;
        assert_eq!(sent, vec![vec![sent[0][0], OP_SET_RAW_FILL_COLOR, 10, 20, 30]]);
        assert_eq!(lamp.raw_led(3), Some(Rgb::new(10, 20, 30)));
        assert_eq!(lamp.with_raw(|raw| raw.dirty_banks().count()), 0);

        lamp.set_raw_led(20, Rgb::new(1, 1, 1));
        let sent = writes_of(&central, &lamp, |lamp| async move { lamp.raw_clear_all().await }).await;
        assert_eq!(sent, vec![vec![sent[0][0], OP_SET_RAW_CLEAR_ALL]]);
        assert_eq!(lamp.raw_led(20), Some(Rgb::BLACK));
        assert_eq!(lamp.with_raw(|raw| raw.dirty_banks().count()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_led_goes_out_at_once() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        lamp.set_raw_led(17, Rgb::new(4, 5, 6));

        let sent = writes_of(&central, &lamp, |lamp| async move { lamp.send_raw_led(17).await }).await;
        assert_eq!(sent, vec![vec![sent[0][0], OP_SET_RAW_LED, 17, 4, 5, 6]]);

        assert!(matches!(lamp.send_raw_led(40).await, Err(LampError::InvalidParameters(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn led_changed_during_show_is_kept_dirty() {
        let central = MockCentral::new();
        let lamp = ready_lamp(&central).await;
        lamp.set_raw_led(0, Rgb::new(255, 0, 0));

        // another slot of bank 0 changes while its packet is on the way
        let writer = lamp.clone();
        central.peripheral().reply_with(move |id, data| {
            if data[1] == OP_SET_RAW_BANK {
                writer.set_raw_led(1, Rgb::new(0, 0, 255));
            }
            Some(Packet::new(id, Body::Ack))
        });

        lamp.show().await.unwrap();

        assert_eq!(lamp.raw_led(1), Some(Rgb::new(0, 0, 255)));
        assert_eq!(lamp.with_raw(|raw| raw.dirty_banks().collect::<Vec<_>>()), vec![0]);
    }
}
