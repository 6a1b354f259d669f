// Handshake Badge: Hardware & System Configuration
// Target: ESP32-C3 badge (BNO055 IMU, ST25DV tag, vibration motor)
//
// Deployment strings are injected at build time through environment
// variables (e.g. `BADGE_EVENT_ID=E042 cargo build`); the fallbacks below
// are only good enough for bench work.

macro_rules! build_env {
    ($name:literal, $default:expr) => {
        match option_env!($name) {
            Some(v) => v,
            None => $default,
        }
    };
}

// ---------------------------------------------------------------------------
// GPIO Pin Definitions
// ---------------------------------------------------------------------------
pub const PIN_I2C_SDA: i32 = 6;   // IMU + NFC tag share the bus
pub const PIN_I2C_SCL: i32 = 7;
pub const PIN_HAPTIC: i32 = 1;    // Vibration motor (LEDC PWM)

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_BAUDRATE_HZ: u32 = 400_000;
pub const I2C_ADDR_BNO055: u8 = 0x28;
pub const I2C_ADDR_ST25DV_USER: u8 = 0x53; // user memory
pub const I2C_TIMEOUT_TICKS: u32 = 1000;   // FreeRTOS ticks

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------
/// Build identifier carried in every advertisement; peers from other builds
/// are ignored.
pub const DEVICE_IDENTIFIER: &str = build_env!("BADGE_IDENTIFIER", "HSBDG1");
pub const EVENT_ID: &str = build_env!("BADGE_EVENT_ID", "E001");
pub const WIFI_SSID: &str = build_env!("BADGE_WIFI_SSID", "");
pub const WIFI_PASSWORD: &str = build_env!("BADGE_WIFI_PASSWORD", "");
pub const MQTT_BROKER_URL: &str = build_env!("BADGE_MQTT_URL", "mqtts://localhost:8883");
pub const MQTT_USERNAME: &str = build_env!("BADGE_MQTT_USERNAME", "");
pub const MQTT_PASSWORD: &str = build_env!("BADGE_MQTT_PASSWORD", "");
/// URI written to the NFC tag once a ticket is assigned.
pub const TAG_URI: &str = build_env!("BADGE_TAG_URI", "https://www.example.com/badge");

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const MAIN_LOOP_INTERVAL_MS: u64 = 2;
pub const SAMPLE_INTERVAL_MS: u32 = 10;          // 100 Hz
pub const PROCESS_INTERVAL_MS: u32 = 1000;       // at most one inference per second
pub const COLLECTION_WINDOW_MS: u32 = 1000;      // peer accumulation after discovery start
pub const HANDSHAKE_DEBOUNCE_MS: u32 = 1250;
pub const WIFI_CONNECT_TIMEOUT_MS: u64 = 15_000;
pub const WIFI_RETRY_DELAY_MS: u32 = 500;

// ---------------------------------------------------------------------------
// Gesture Model
// ---------------------------------------------------------------------------
pub const WINDOW_SIZE: usize = 125;              // 1.25 s at 100 Hz
pub const NUM_FEATURES: usize = 6;               // linear accel xyz, gyro xyz
pub const MODEL_INPUT_LEN: usize = WINDOW_SIZE * NUM_FEATURES; // 750
pub const GESTURE_LABEL_COUNT: usize = 12;
pub const HANDSHAKE_CLASS: usize = 4;
pub const ACCEPT_THRESHOLD: f32 = 0.9;
pub const PRESENCE_THRESHOLD: f32 = 0.5;
pub const TENSOR_ARENA_SIZE: usize = 80 * 1024;

// ---------------------------------------------------------------------------
// BNO055 Scale Factors
// ---------------------------------------------------------------------------
pub const LINEAR_ACCEL_LSB_PER_MS2: f32 = 100.0;
pub const GYRO_LSB_PER_DPS: f32 = 16.0;

// ---------------------------------------------------------------------------
// Peer Discovery Radio
// ---------------------------------------------------------------------------
pub const ADV_NAME_MARKER: &str = "EZ";
pub const RSSI_THRESHOLD_DBM: i32 = -65;
pub const MAX_CANDIDATES: usize = 16;
pub const ADV_INTERVAL_UNITS: u16 = 0x20;        // 20 ms in 0.625 ms units
pub const SCAN_INTERVAL_UNITS: u16 = 0x50;
pub const SCAN_WINDOW_UNITS: u16 = 0x30;

// ---------------------------------------------------------------------------
// Haptic Feedback
// ---------------------------------------------------------------------------
pub const HAPTIC_PWM_FREQUENCY_HZ: u32 = 5000;
pub const HAPTIC_FULL_POWER: u8 = 255;
pub const ASSIGN_PULSE_MS: u32 = 1000;
pub const PROFILE_SWAP_PULSE_MS: u32 = 500;
pub const EXCHANGE_PULSE_MS: u32 = 500;

// ---------------------------------------------------------------------------
// Retry Policy
// ---------------------------------------------------------------------------
pub const TAG_WRITE_RETRY_MS: u32 = 500;
pub const TAG_WRITE_MAX_ATTEMPTS: u8 = 10;
pub const PUBLISH_MAX_ATTEMPTS: u8 = 5;
pub const PUBLISH_RETRY_MS: u32 = 1000;
pub const MAX_SEEN_PEERS: usize = 64;

// ---------------------------------------------------------------------------
// NFC Tag
// ---------------------------------------------------------------------------
pub const TAG_ERASE_LEN: usize = 256;
pub const TAG_WRITE_CHUNK: usize = 16;
