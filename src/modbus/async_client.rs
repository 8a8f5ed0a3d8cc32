use async_trait::async_trait;
use std::sync::Arc;

use super::client::RtuClient;
use super::transport::Transport;
use crate::utils::error::ModbusError;

#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    async fn read_coils(&self, slave: u8, address: u16, quantity: u16) -> Result<Vec<u8>, ModbusError>;

    async fn read_discrete_inputs(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, ModbusError>;

    async fn read_holding_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn read_input_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn write_single_coil(&self, slave: u8, address: u16, on: bool) -> Result<(), ModbusError>;

    async fn write_single_register(&self, slave: u8, address: u16, value: u16) -> Result<(), ModbusError>;

    async fn write_multiple_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
        values: Vec<u8>,
    ) -> Result<(), ModbusError>;
}

/// Runs the blocking [`RtuClient`] on tokio's blocking pool. The client's own
/// lock still serializes transactions, whichever task issues them.
pub struct AsyncRtuClient<T: Transport + 'static> {
    inner: Arc<RtuClient<T>>,
}

impl<T: Transport + 'static> Clone for AsyncRtuClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> AsyncRtuClient<T> {
    pub fn new(client: RtuClient<T>) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    pub fn blocking(&self) -> &RtuClient<T> {
        &self.inner
    }

    async fn run<R, F>(&self, op: F) -> Result<R, ModbusError>
    where
        R: Send + 'static,
        F: FnOnce(&RtuClient<T>) -> Result<R, ModbusError> + Send + 'static,
    {
        let client = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&client))
            .await
            .map_err(|e| ModbusError::Join(e.to_string()))?
    }
}

#[async_trait]
impl<T: Transport + 'static> ModbusClientTrait for AsyncRtuClient<T> {
    async fn read_coils(&self, slave: u8, address: u16, quantity: u16) -> Result<Vec<u8>, ModbusError> {
        self.run(move |c| c.read_coils(slave, address, quantity)).await
    }

    async fn read_discrete_inputs(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u8>, ModbusError> {
        self.run(move |c| c.read_discrete_inputs(slave, address, quantity)).await
    }

    async fn read_holding_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.run(move |c| c.read_holding_registers(slave, address, quantity)).await
    }

    async fn read_input_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.run(move |c| c.read_input_registers(slave, address, quantity)).await
    }

    async fn write_single_coil(&self, slave: u8, address: u16, on: bool) -> Result<(), ModbusError> {
        self.run(move |c| c.write_single_coil(slave, address, on)).await
    }

    async fn write_single_register(&self, slave: u8, address: u16, value: u16) -> Result<(), ModbusError> {
        self.run(move |c| c.write_single_register(slave, address, value)).await
    }

    async fn write_multiple_registers(
        &self,
        slave: u8,
        address: u16,
        quantity: u16,
        values: Vec<u8>,
    ) -> Result<(), ModbusError> {
        self.run(move |c| c.write_multiple_registers(slave, address, quantity, &values))
            .await
    }
}
