use plink::{RemoteImu, SensorSource};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let mut imu = RemoteImu::connect(&port, 115200, Duration::from_millis(20))?;
    println!("Reading controller IMU over {}...", port);

    loop {
        match imu.read() {
            Ok(data) => {
                let accel = data.accelerometer.unwrap_or_default();
                let gyro = data.gyroscope.unwrap_or_default();
                let mag = data.magnetometer.unwrap_or_default();
                println!(
                    "acc:   x: {: >10.3} y: {: >10.3} z: {: >10.3}\n\
                     gyro:  x: {: >10.3} y: {: >10.3} z: {: >10.3}\n\
                     mag:   x: {: >10.3} y: {: >10.3} z: {: >10.3}\n",
                    accel.x, accel.y, accel.z, gyro.x, gyro.y, gyro.z, mag.x, mag.y, mag.z,
                );
            }
            Err(e) => eprintln!("Error reading from controller IMU: {}", e),
        }

        thread::sleep(Duration::from_millis(10));
    }
}
