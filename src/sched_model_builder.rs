//! `CpuSchedModelBuilder` — assembles the fixed task chain every model runs
//! on its scheduler stream: dequeue inputs, advance the step counter,
//! activate and wait on the device-side graph, enqueue outputs, repeat.

use gehete_drv_core::Stream;

use crate::error::Result;
use crate::sched_task::{
    QueueInfoKernelArgs, SchedTaskActiveModel, SchedTaskGatherDequeue, SchedTaskInfo,
    SchedTaskMarkStep, SchedTaskModelBatchDequeue, SchedTaskModelBatchDequeueBuff,
    SchedTaskModelBatchEnqueue, SchedTaskModelDequeue, SchedTaskModelEnqueue,
    SchedTaskModelRepeat, SchedTaskModelWaitEndGraph, TaskIdAllocator,
};

/// Which side of a model a queue feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    Input,
    Output,
}

/// One queue bound to a model, tagged with the role the builder assigned it.
#[derive(Debug, Clone, Copy)]
pub struct ModelQueueBinding {
    pub queue_id: u32,
    pub device_id: i32,
    pub role: QueueRole,
    pub is_client: bool,
}

/// A built model: its stream and the ordered task chain that runs on it,
/// plus the queue bindings the loader/executor need to address it.
pub struct ModelInfo {
    pub model_id: u32,
    pub stream: Stream,
    pub queues: Vec<ModelQueueBinding>,
    tasks: Vec<Box<dyn SchedTaskInfo>>,
}

impl ModelInfo {
    /// Launches every task in build order on the model's own stream.
    pub fn distribute_all(&self) -> Result<()> {
        for task in &self.tasks {
            task.distribute(self.stream)?;
        }
        Ok(())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    #[cfg(test)]
    fn task_kernel_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.kernel_name()).collect()
    }
}

unsafe impl Send for ModelInfo {}

/// One input queue the builder should dequeue from.
#[derive(Debug, Clone, Copy)]
pub struct InputQueueSpec {
    pub queue_id: u32,
    pub device_id: i32,
    pub is_client: bool,
    pub align_offset: i32,
}

/// One output queue the builder should enqueue to.
#[derive(Debug, Clone, Copy)]
pub struct OutputQueueSpec {
    pub queue_id: u32,
    pub device_id: i32,
}

/// Everything the builder needs to lay out one model's task chain.
pub struct ModelBuildSpec {
    pub model_id: u32,
    pub inputs: Vec<InputQueueSpec>,
    pub outputs: Vec<OutputQueueSpec>,
    /// `> 0` enables cross-queue alignment via `gatherDequeue` when more
    /// than one input is present.
    pub align_max_cache_num: u32,
    pub align_timeout_ms: u32,
    pub drop_when_not_align: bool,
    pub group_total_count: u32,
    pub group_index: u32,
    pub group_policy: u32,
    pub dump_step: String,
    pub global_step_addr: u64,
    pub is_head: bool,
}

/// Builds the fixed per-model scheduler-stream task chain in the order the
/// device expects: dequeue inputs, `markStep`, `activeModel` +
/// `modelWaitEndGraph`, enqueue outputs, `modelRepeat`.
pub struct CpuSchedModelBuilder {
    task_ids: TaskIdAllocator,
}

impl CpuSchedModelBuilder {
    pub fn new() -> CpuSchedModelBuilder {
        CpuSchedModelBuilder { task_ids: TaskIdAllocator::new() }
    }

    pub fn build(&mut self, spec: &ModelBuildSpec, stream: Stream) -> Result<ModelInfo> {
        let mut tasks: Vec<Box<dyn SchedTaskInfo>> = Vec::new();
        let mut queues = Vec::new();

        self.build_input_dequeue(spec, &mut tasks, &mut queues)?;

        // Unconditional: every plan carries exactly one `markStep`, zeroing
        // `*global_step_addr` once at build time regardless of whether a
        // dump-step tag or replica group is configured for this model.
        tasks.push(Box::new(SchedTaskMarkStep::new(
            self.task_ids.next(),
            spec.group_total_count,
            spec.group_index,
            spec.group_policy,
            &spec.dump_step,
            spec.global_step_addr,
            spec.is_head,
        )?));

        tasks.push(Box::new(SchedTaskActiveModel::new(self.task_ids.next(), spec.model_id)?));
        tasks.push(Box::new(SchedTaskModelWaitEndGraph::new(self.task_ids.next(), spec.model_id)?));

        self.build_output_enqueue(spec, &mut tasks, &mut queues)?;

        tasks.push(Box::new(SchedTaskModelRepeat::new(self.task_ids.next(), spec.model_id)?));

        Ok(ModelInfo { model_id: spec.model_id, stream, queues, tasks })
    }

    fn build_input_dequeue(
        &mut self,
        spec: &ModelBuildSpec,
        tasks: &mut Vec<Box<dyn SchedTaskInfo>>,
        queues: &mut Vec<ModelQueueBinding>,
    ) -> Result<()> {
        for input in &spec.inputs {
            queues.push(ModelQueueBinding {
                queue_id: input.queue_id,
                device_id: input.device_id,
                role: QueueRole::Input,
                is_client: input.is_client,
            });
        }

        if spec.align_max_cache_num > 0 && spec.inputs.len() > 1 {
            let queue_infos: Vec<QueueInfoKernelArgs> = spec
                .inputs
                .iter()
                .map(|i| QueueInfoKernelArgs { queue_id: i.queue_id, device_id: i.device_id })
                .collect();
            let device_types = vec![0u32; spec.inputs.len()];
            tasks.push(Box::new(SchedTaskGatherDequeue::new(
                self.task_ids.next(),
                spec.align_timeout_ms,
                spec.align_max_cache_num,
                spec.drop_when_not_align,
                &queue_infos,
                &device_types,
            )?));
            return Ok(());
        }

        let has_alignment = spec.inputs.iter().any(|i| i.align_offset != 0);
        if has_alignment {
            let offsets: Vec<i32> = spec.inputs.iter().map(|i| i.align_offset).collect();
            let queue_ids: Vec<u32> = spec.inputs.iter().map(|i| i.queue_id).collect();
            tasks.push(Box::new(SchedTaskModelBatchDequeue::new(
                self.task_ids.next(),
                0,
                &offsets,
                &queue_ids,
            )?));
            return Ok(());
        }

        let mut client_queues = Vec::new();
        for input in &spec.inputs {
            if input.is_client {
                client_queues.push(QueueInfoKernelArgs { queue_id: input.queue_id, device_id: input.device_id });
            } else {
                tasks.push(Box::new(SchedTaskModelDequeue::new(self.task_ids.next(), input.queue_id, 0)?));
            }
        }
        if !client_queues.is_empty() {
            let offsets = vec![0i32; client_queues.len()];
            tasks.push(Box::new(SchedTaskModelBatchDequeueBuff::new(self.task_ids.next(), 0, &offsets, &client_queues)?));
        }
        Ok(())
    }

    fn build_output_enqueue(
        &mut self,
        spec: &ModelBuildSpec,
        tasks: &mut Vec<Box<dyn SchedTaskInfo>>,
        queues: &mut Vec<ModelQueueBinding>,
    ) -> Result<()> {
        for output in &spec.outputs {
            queues.push(ModelQueueBinding {
                queue_id: output.queue_id,
                device_id: output.device_id,
                role: QueueRole::Output,
                is_client: false,
            });
        }

        if spec.outputs.len() == 1 {
            let out = &spec.outputs[0];
            tasks.push(Box::new(SchedTaskModelEnqueue::new(self.task_ids.next(), out.queue_id, 0)?));
        } else if spec.outputs.len() > 1 {
            let queue_infos: Vec<QueueInfoKernelArgs> = spec
                .outputs
                .iter()
                .map(|o| QueueInfoKernelArgs { queue_id: o.queue_id, device_id: o.device_id })
                .collect();
            tasks.push(Box::new(SchedTaskModelBatchEnqueue::new(self.task_ids.next(), &queue_infos)?));
        }
        Ok(())
    }
}

impl Default for CpuSchedModelBuilder {
    fn default() -> CpuSchedModelBuilder {
        CpuSchedModelBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(model_id: u32) -> ModelBuildSpec {
        ModelBuildSpec {
            model_id,
            inputs: vec![InputQueueSpec { queue_id: 1, device_id: 0, is_client: false, align_offset: 0 }],
            outputs: vec![OutputQueueSpec { queue_id: 2, device_id: 0 }],
            align_max_cache_num: 0,
            align_timeout_ms: 0,
            drop_when_not_align: false,
            group_total_count: 0,
            group_index: 0,
            group_policy: 0,
            dump_step: String::new(),
            global_step_addr: 0,
            is_head: true,
        }
    }

    #[test]
    fn single_input_output_chain_has_six_tasks() {
        let mut builder = CpuSchedModelBuilder::new();
        let model = builder.build(&spec(7), std::ptr::null_mut()).unwrap();
        // modelDequeue, markStep, activeModel, modelWaitEndGraph, modelEnqueue, modelRepeat
        assert_eq!(model.task_count(), 6);
        assert_eq!(model.queues.len(), 2);
    }

    #[test]
    fn multi_input_alignment_uses_gather_dequeue() {
        let mut builder = CpuSchedModelBuilder::new();
        let mut s = spec(8);
        s.inputs.push(InputQueueSpec { queue_id: 3, device_id: 0, is_client: false, align_offset: 0 });
        s.align_max_cache_num = 4;
        let model = builder.build(&s, std::ptr::null_mut()).unwrap();
        // gatherDequeue, markStep, activeModel, modelWaitEndGraph, modelEnqueue, modelRepeat
        assert_eq!(model.task_count(), 6);
    }

    #[test]
    fn build_emits_exactly_one_of_each_lifecycle_task_in_order() {
        let mut builder = CpuSchedModelBuilder::new();
        let model = builder.build(&spec(9), std::ptr::null_mut()).unwrap();
        let names = model.task_kernel_names();
        assert_eq!(names.iter().filter(|&&n| n == "markStep").count(), 1);
        assert_eq!(names.iter().filter(|&&n| n == "activeModel").count(), 1);
        assert_eq!(names.iter().filter(|&&n| n == "modelWaitEndGraph").count(), 1);
        assert_eq!(names.iter().filter(|&&n| n == "modelRepeat").count(), 1);

        let active_pos = names.iter().position(|&n| n == "activeModel").unwrap();
        let wait_pos = names.iter().position(|&n| n == "modelWaitEndGraph").unwrap();
        let dequeue_pos = names.iter().position(|&n| n == "modelDequeue").unwrap();
        let enqueue_pos = names.iter().position(|&n| n == "modelEnqueue").unwrap();
        assert!(dequeue_pos < active_pos);
        assert!(active_pos < wait_pos);
        assert!(wait_pos < enqueue_pos);
    }
}
